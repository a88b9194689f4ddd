// CLI media-info provider - uses native `yt-dlp` binary
//
// Runs `yt-dlp --dump-json` once per URL and turns the JSON into a
// MediaInfo: display metadata plus the raw formats list.

use async_trait::async_trait;
use time::macros::format_description;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{Format, MediaInfo, NetworkConfig};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::MediaInfoProvider;
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout, stderr_summary};

/// Hard cap on one info extraction when no socket timeout is configured
const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 60;

/// CLI-based info provider using yt-dlp binary
pub struct YtDlpInfoProvider {
    ytdlp_path: String,
    network: NetworkConfig,
}

impl YtDlpInfoProvider {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            ytdlp_path: ToolManager::new().resolve_or_bare(ToolType::YtDlp),
            network,
        }
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.ytdlp_path = path.into();
        self
    }

    /// Build command arguments
    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
        ];
        args.extend(get_timeout_args(&self.network));
        args.extend(get_proxy_args(&self.network));
        args.push(url.to_string());
        args
    }

    fn process_timeout(&self) -> u64 {
        self.network
            .timeout
            .map(|t| t as u64 * 2)
            .unwrap_or(DEFAULT_EXTRACT_TIMEOUT_SECS)
    }

    /// Parse JSON output
    pub fn parse_json(stdout: &[u8]) -> Result<MediaInfo, DownloadError> {
        let json_str = String::from_utf8_lossy(stdout);
        let json: serde_json::Value = serde_json::from_str(&json_str)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        let formats = Self::parse_formats(&json);

        Ok(MediaInfo {
            id: json["id"].as_str().unwrap_or("unknown").to_string(),
            title: json["title"].as_str().unwrap_or("output").to_string(),
            uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
            view_count: json["view_count"].as_u64(),
            like_count: json["like_count"].as_u64(),
            upload_date: json["upload_date"].as_str().and_then(parse_upload_date),
            description: json["description"].as_str().unwrap_or("").to_string(),
            thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
            webpage_url: json["webpage_url"].as_str().unwrap_or("").to_string(),
            formats,
        })
    }

    fn parse_formats(json: &serde_json::Value) -> Vec<Format> {
        let Some(formats_array) = json["formats"].as_array() else {
            // Nothing to choose from is a valid state
            return Vec::new();
        };

        formats_array
            .iter()
            .filter_map(|f| match serde_json::from_value::<Format>(f.clone()) {
                Ok(format) => Some(format),
                Err(e) => {
                    tracing::warn!(
                        format_id = f["format_id"].as_str().unwrap_or("?"),
                        error = %e,
                        "skipping undecodable format entry"
                    );
                    None
                }
            })
            .collect()
    }
}

impl Default for YtDlpInfoProvider {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

/// yt-dlp reports upload dates as YYYYMMDD
fn parse_upload_date(raw: &str) -> Option<time::Date> {
    let format = format_description!("[year][month][day]");
    time::Date::parse(raw, &format).ok()
}

#[async_trait]
impl MediaInfoProvider for YtDlpInfoProvider {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, DownloadError> {
        let args = self.build_args(url);
        tracing::debug!(program = %self.ytdlp_path, args = %args.join(" "), "extracting media info");

        let out = run_output_with_timeout(&self.ytdlp_path, args, self.process_timeout())
            .await
            .map_err(|e| DownloadError::MetadataUnavailable(e.to_string()))?;

        if !out.status.success() {
            let stderr = stderr_summary(&out.stderr);
            tracing::warn!(url, error = %stderr, "yt-dlp info extraction failed");
            return Err(DownloadError::from(stderr));
        }

        Self::parse_json(&out.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "abc123",
        "title": "Live at Wembley / 1986",
        "uploader": "Queen Official",
        "view_count": 1500000,
        "like_count": 42000,
        "upload_date": "20190418",
        "description": "Full concert",
        "thumbnail": "https://i.ytimg.com/vi/abc123/maxresdefault.jpg",
        "webpage_url": "https://www.youtube.com/watch?v=abc123",
        "formats": [
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2",
             "abr": 129.478, "filesize": 3456789},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none",
             "height": 1080, "filesize_approx": 98765432, "fps": 30},
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none",
             "abr": null, "height": 45}
        ]
    }"#;

    #[test]
    fn test_parse_json() {
        let info = YtDlpInfoProvider::parse_json(SAMPLE.as_bytes()).unwrap();

        assert_eq!(info.title, "Live at Wembley / 1986");
        assert_eq!(info.view_count, Some(1_500_000));
        assert_eq!(
            info.upload_date,
            Some(time::Date::from_calendar_date(2019, time::Month::April, 18).unwrap())
        );
        assert_eq!(info.formats.len(), 3);
        assert_eq!(info.formats[0].abr, Some(129.478));
        assert_eq!(info.formats[1].effective_size(), Some(98_765_432));
        assert_eq!(info.formats[2].abr, None);
    }

    #[test]
    fn test_missing_formats_is_empty_catalog() {
        let info = YtDlpInfoProvider::parse_json(br#"{"title": "x"}"#).unwrap();
        assert!(info.formats.is_empty());
        assert_eq!(info.upload_date, None);
    }

    #[test]
    fn test_bad_format_entries_are_skipped() {
        let json = br#"{
            "title": "x",
            "formats": [
                {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5},
                {"format_id": "251", "vcodec": "none", "acodec": "opus", "filesize_approx": 1234.5},
                {"format_id": "22", "ext": 5},
                "garbage"
            ]
        }"#;
        let info = YtDlpInfoProvider::parse_json(json).unwrap();

        let ids: Vec<_> = info.formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec!["140", "251"]);
        assert_eq!(info.formats[1].filesize_approx, Some(1235));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = YtDlpInfoProvider::parse_json(b"not json").unwrap_err();
        assert!(matches!(err, DownloadError::ParseError(_)));
    }

    #[test]
    fn test_build_args() {
        let provider = YtDlpInfoProvider::new(NetworkConfig::default()).with_binary("yt-dlp");
        let args = provider.build_args("https://youtu.be/abc123");
        assert_eq!(args[0], "--dump-json");
        assert!(args.windows(2).any(|w| w == ["--socket-timeout", "30"]));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc123");
        assert_eq!(provider.process_timeout(), 60);
    }
}
