// Error types for the download/merge core

use thiserror::Error;

use super::models::Stage;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Media-info provider could not describe the asset
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// Transport failed while fetching one stage
    #[error("Transfer failed during {stage} stage: {cause}")]
    TransferFailed { stage: Stage, cause: String },

    /// Both remux bindings failed
    #[error("Merge failed: primary binding: {primary}; fallback command: {fallback}")]
    MergeFailed { primary: String, fallback: String },

    /// yt-dlp or ffmpeg not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn transfer(stage: Stage, cause: impl ToString) -> Self {
        Self::TransferFailed {
            stage,
            cause: cause.to_string(),
        }
    }

    /// Whether this failure belongs to the media-info step
    pub fn is_metadata(&self) -> bool {
        matches!(self, Self::MetadataUnavailable(_))
    }
}

// Classify raw yt-dlp stderr text coming back from an info extraction
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        if s.contains("not found") || s.contains("No such file") || s.contains("command not found") {
            return Self::ToolNotFound(s);
        }

        if s.contains("parse") || s.contains("JSON") {
            return Self::ParseError(s);
        }

        Self::MetadataUnavailable(s)
    }
}
