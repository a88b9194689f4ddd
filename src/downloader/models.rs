// Common data models for downloader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const MIB: f64 = 1_048_576.0;

/// One elementary stream as reported by the media-info provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: String,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    /// Video height in pixels
    #[serde(deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    /// Average audio bitrate in kbps
    pub abr: Option<f64>,
    /// File size in bytes
    #[serde(deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    /// Approximate file size (when exact is unknown)
    #[serde(deserialize_with = "lenient_u64")]
    pub filesize_approx: Option<u64>,
}

impl Format {
    /// Get effective file size (exact or approximate)
    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    /// Audio bitrate with a missing value read as 0 kbps
    pub fn bitrate(&self) -> f64 {
        self.abr.unwrap_or(0.0)
    }

    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }

    pub fn has_audio(&self) -> bool {
        codec_present(self.acodec.as_deref())
    }

    /// Video-only or audio-only; muxed and codec-less streams have no kind.
    /// Only an explicit "none" marks a codec absent, a missing field does not.
    pub fn kind(&self) -> Option<StreamKind> {
        match (self.has_video(), self.has_audio()) {
            (true, false) => Some(StreamKind::Video),
            (false, true) => Some(StreamKind::Audio),
            _ => None,
        }
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    codec != Some("none")
}

// yt-dlp sometimes reports sizes and dimensions as floats
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient_u64(deserializer)?.and_then(|v| u32::try_from(v).ok()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

/// Asset description returned by the media-info provider
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub upload_date: Option<time::Date>,
    pub description: String,
    pub thumbnail: String,
    pub webpage_url: String,
    pub formats: Vec<Format>,
}

impl MediaInfo {
    /// Description cut to `limit` characters, with "..." when trimmed
    pub fn description_preview(&self, limit: usize) -> String {
        if self.description.chars().count() <= limit {
            return self.description.clone();
        }
        let mut preview: String = self.description.chars().take(limit).collect();
        preview.push_str("...");
        preview
    }
}

/// Pipeline phase used to scope progress and status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Audio,
    Video,
    Merge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Merge => "merge",
        }
    }

    fn capitalized(&self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Video => "Video",
            Self::Merge => "Merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Downloading,
    Completed,
    Merging,
    Processing,
}

impl Status {
    /// Human-readable status line for a stage
    pub fn message(&self, stage: Stage) -> String {
        match self {
            Self::Downloading => format!("{} Downloading...", stage.capitalized()),
            Self::Completed => format!("{} Download Complete.", stage.capitalized()),
            Self::Merging => "Merging Audio and Video...".to_string(),
            Self::Processing => "Post-processing...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    Downloading,
    Finished,
    /// Synthetic merge ticks
    Processing,
}

impl TransferPhase {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "downloading" => Some(Self::Downloading),
            "finished" => Some(Self::Finished),
            "processing" => Some(Self::Processing),
            _ => None,
        }
    }
}

/// Raw progress notification from the transport layer
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    /// Transport status string ("downloading", "finished", "error", ...)
    pub status: String,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
}

/// Progress of one active transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferState {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub speed: Option<f64>,
    pub percent: f64,
    pub phase: TransferPhase,
}

impl TransferState {
    /// Translate a transport notification; only downloading/finished events count
    pub fn from_event(event: &TransportEvent) -> Option<Self> {
        let phase = match TransferPhase::parse(&event.status)? {
            TransferPhase::Processing => return None,
            phase => phase,
        };
        let downloaded = event.downloaded_bytes.unwrap_or(0);
        let total = event
            .total_bytes
            .filter(|t| *t > 0)
            .or(event.total_bytes_estimate.filter(|t| *t > 0));
        let percent = total.map_or(0.0, |t| downloaded as f64 / t as f64 * 100.0);

        Some(Self {
            downloaded,
            total,
            speed: event.speed,
            percent,
            phase,
        })
    }

    /// Synthetic merge tick at `percent`
    pub fn processing(percent: u8) -> Self {
        Self {
            downloaded: percent as u64,
            total: Some(100),
            speed: None,
            percent: percent as f64,
            phase: TransferPhase::Processing,
        }
    }
}

/// Video stream paired with its closest audio tier
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub video: Format,
    pub audio: Option<Format>,
    pub height: u32,
    pub abr: Option<f64>,
    pub ext_video: String,
    pub ext_audio: Option<String>,
    /// Video size + audio size, missing sizes read as 0
    pub size: u64,
}

impl Combination {
    pub fn new(video: Format, audio: Option<Format>) -> Self {
        let v_size = video.effective_size().unwrap_or(0);
        let a_size = audio.as_ref().and_then(|a| a.effective_size()).unwrap_or(0);

        Self {
            height: video.height.unwrap_or(0),
            abr: audio.as_ref().and_then(|a| a.abr),
            ext_video: video.ext.clone(),
            ext_audio: audio.as_ref().map(|a| a.ext.clone()),
            size: v_size + a_size,
            video,
            audio,
        }
    }

    /// Menu label (e.g., "720p mp4 - 12.50 MB")
    pub fn label(&self) -> String {
        format!(
            "{}p {} - {:.2} MB",
            self.height,
            self.ext_video,
            self.size as f64 / MIB
        )
    }

    /// Quality part of the output file name (e.g., "720p_128kbps").
    /// Bitrates use f64 Display, so 128.0 prints as "128" and 129.478 as "129.478".
    pub fn quality_descriptor(&self) -> String {
        match self.abr {
            Some(abr) => format!("{}p_{}kbps", self.height, abr),
            None if self.audio.is_some() => format!("{}p_0kbps", self.height),
            None => format!("{}p", self.height),
        }
    }
}

/// Menu label for an audio tier (e.g., "128 kbps (m4a) - 3.10 MB")
pub fn audio_label(format: &Format) -> String {
    format!(
        "{} kbps ({}) - {:.2} MB",
        format.bitrate(),
        format.ext,
        format.effective_size().unwrap_or(0) as f64 / MIB
    )
}

/// Network configuration for yt-dlp
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// SOCKS5 proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Timeout in seconds
    pub timeout: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Some(30),
        }
    }
}

/// Cadence of the synthetic merge progress reporter
#[derive(Debug, Clone, Copy)]
pub struct TickerConfig {
    /// Percent added per tick
    pub step: u8,
    pub interval: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            step: 2,
            interval: Duration::from_millis(10),
        }
    }
}

/// Output layout and policies for the orchestrator
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub video_dir: PathBuf,
    pub audio_dir: PathBuf,
    /// Scratch directory for the separately fetched video/audio streams
    pub temp_dir: PathBuf,
    /// Leave scratch files behind after a video+audio download
    pub keep_temp_files: bool,
    pub network: NetworkConfig,
    pub ticker: TickerConfig,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        let root = dirs::download_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("downloads");

        Self {
            video_dir: root.join("video"),
            audio_dir: root.join("audio"),
            temp_dir: root.join(".temp"),
            keep_temp_files: false,
            network: NetworkConfig::default(),
            ticker: TickerConfig::default(),
        }
    }
}

impl DownloaderConfig {
    /// Lay out video/, audio/ and .temp/ under `root`
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            video_dir: root.join("video"),
            audio_dir: root.join("audio"),
            temp_dir: root.join(".temp"),
            ..Self::default()
        }
    }

    pub fn with_keep_temp_files(mut self, keep: bool) -> Self {
        self.keep_temp_files = keep;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.network.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: Option<u32>) -> Self {
        self.network.timeout = seconds;
        self
    }

    pub fn with_ticker(mut self, ticker: TickerConfig) -> Self {
        self.ticker = ticker;
        self
    }

    /// Create the output and scratch directories if missing
    pub async fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.video_dir, &self.audio_dir, &self.temp_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
