// Format catalog and the per-asset session value

use super::errors::DownloadError;
use super::format_selector::{bucket_audio, pair_qualities};
use super::models::{Combination, Format, MediaInfo, StreamKind};
use super::traits::MediaInfoProvider;

/// Video-only and audio-only streams of one asset, in catalog order
#[derive(Debug, Clone, Default)]
pub struct FormatCatalog {
    video: Vec<Format>,
    audio: Vec<Format>,
}

impl FormatCatalog {
    /// Classify raw formats; muxed or codec-less entries are dropped
    pub fn from_formats(formats: impl IntoIterator<Item = Format>) -> Self {
        let mut catalog = Self::default();
        for format in formats {
            match format.kind() {
                Some(StreamKind::Video) => catalog.video.push(format),
                Some(StreamKind::Audio) => catalog.audio.push(format),
                None => {}
            }
        }
        catalog
    }

    pub fn video(&self) -> &[Format] {
        &self.video
    }

    pub fn audio(&self) -> &[Format] {
        &self.audio
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

/// Immutable view of one asset: sanitized title plus its catalog
#[derive(Debug, Clone)]
pub struct Session {
    title: String,
    catalog: FormatCatalog,
}

impl Session {
    pub fn new(title: &str, formats: impl IntoIterator<Item = Format>) -> Self {
        Self {
            title: sanitize_title(title),
            catalog: FormatCatalog::from_formats(formats),
        }
    }

    /// Session with no formats; every menu comes out empty
    pub fn empty() -> Self {
        Self::new("", Vec::new())
    }

    pub fn from_info(info: &MediaInfo) -> Self {
        Self::new(&info.title, info.formats.iter().cloned())
    }

    pub async fn load(provider: &dyn MediaInfoProvider, url: &str) -> Result<Self, DownloadError> {
        let info = provider.fetch_info(url).await.map_err(|e| match e {
            DownloadError::MetadataUnavailable(_) => e,
            other => DownloadError::MetadataUnavailable(other.to_string()),
        })?;
        tracing::info!(
            provider = provider.name(),
            title = %info.title,
            formats = info.formats.len(),
            "loaded media info"
        );
        Ok(Self::from_info(&info))
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    /// Audio tiers, ascending by bitrate tier
    pub fn audio_options(&self) -> Vec<Format> {
        bucket_audio(self.catalog.audio())
    }

    /// One video+audio choice per distinct height, ascending
    pub fn combinations(&self) -> Vec<Combination> {
        pair_qualities(self.catalog.video(), &self.audio_options())
    }
}

/// File-name safe title: path separators collapse to `_`
pub fn sanitize_title(title: &str) -> String {
    if title.is_empty() {
        return "output".to_string();
    }
    title.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn format(id: &str, vcodec: Option<&str>, acodec: Option<&str>) -> Format {
        Format {
            format_id: id.to_string(),
            vcodec: vcodec.map(str::to_string),
            acodec: acodec.map(str::to_string),
            ..Format::default()
        }
    }

    #[test]
    fn test_catalog_splits_by_kind() {
        let catalog = FormatCatalog::from_formats(vec![
            format("137", Some("avc1"), Some("none")),
            format("140", Some("none"), Some("mp4a.40.2")),
            format("18", Some("avc1"), Some("mp4a.40.2")),
            format("sb0", Some("none"), Some("none")),
            format("251", None, Some("opus")),
            format("136", Some("avc1"), None),
        ]);

        let video: Vec<_> = catalog.video().iter().map(|f| f.format_id.as_str()).collect();
        let audio: Vec<_> = catalog.audio().iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(video, vec!["137"]);
        assert_eq!(audio, vec!["140"]);
    }

    #[test]
    fn test_empty_session_yields_empty_menus() {
        let session = Session::empty();
        assert_eq!(session.title(), "output");
        assert!(session.catalog().is_empty());
        assert!(session.audio_options().is_empty());
        assert!(session.combinations().is_empty());
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("AC/DC \\ Live"), "AC_DC _ Live");
        assert_eq!(sanitize_title(" padded/title "), " padded_title ");
        assert_eq!(sanitize_title(""), "output");
    }

    struct FailingProvider;

    #[async_trait]
    impl MediaInfoProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_info(&self, _url: &str) -> Result<MediaInfo, DownloadError> {
            Err(DownloadError::ExecutionError("Timed out after 30s".to_string()))
        }
    }

    #[tokio::test]
    async fn test_load_surfaces_metadata_unavailable() {
        let err = Session::load(&FailingProvider, "https://example.com/v")
            .await
            .unwrap_err();
        assert!(err.is_metadata());
    }
}
