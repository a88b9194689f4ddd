// Seams to the external tools and the caller's callbacks

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::errors::DownloadError;
use super::models::{MediaInfo, Stage, Status, TransferState, TransportEvent};

/// Describes a remote asset (title, formats, metadata)
#[async_trait]
pub trait MediaInfoProvider: Send + Sync {
    /// Name of the provider (for logging)
    fn name(&self) -> &'static str;

    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, DownloadError>;
}

/// Moves the bytes of one stream to disk
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Download `stream_id` to `dest`, overwriting it, reporting every
    /// progress notification through `on_event`
    async fn transfer(
        &self,
        stream_id: &str,
        dest: &Path,
        on_event: &(dyn Fn(TransportEvent) + Send + Sync),
    ) -> Result<(), DownloadError>;
}

/// Stream-copy remux of one video and one audio file into a container
#[async_trait]
pub trait RemuxBinding: Send + Sync {
    fn name(&self) -> &'static str;

    async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}

pub type ProgressCallback = Arc<dyn Fn(Stage, &TransferState) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(Stage, Status) + Send + Sync>;

/// Progress emitter helper; missing callbacks make emission a no-op
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    progress: Option<ProgressCallback>,
    status: Option<StatusCallback>,
}

impl ProgressEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, callback: impl Fn(Stage, &TransferState) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn on_status(mut self, callback: impl Fn(Stage, Status) + Send + Sync + 'static) -> Self {
        self.status = Some(Arc::new(callback));
        self
    }

    pub fn progress(&self, stage: Stage, state: &TransferState) {
        if let Some(callback) = &self.progress {
            callback(stage, state);
        }
    }

    pub fn status(&self, stage: Stage, status: Status) {
        tracing::debug!(%stage, ?status, "status");
        if let Some(callback) = &self.status {
            callback(stage, status);
        }
    }
}

impl std::fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("progress", &self.progress.is_some())
            .field("status", &self.status.is_some())
            .finish()
    }
}
