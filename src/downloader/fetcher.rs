// Stream fetcher - one elementary stream to one file, with stage-scoped progress

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::errors::DownloadError;
use super::models::{NetworkConfig, Stage, TransferState, TransportEvent};
use super::tools::{ToolManager, ToolType};
use super::traits::{ProgressEmitter, Transport};
use super::utils::{get_proxy_args, get_timeout_args, stderr_summary};

/// Marker prefix of our --progress-template lines
const PROGRESS_PREFIX: &str = "AVP|";

const PROGRESS_TEMPLATE: &str = "download:AVP|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s";

/// One fetch: which stream, where to, which stage it reports as
pub struct FetchRequest<'a> {
    pub stream_id: &'a str,
    pub dest: &'a Path,
    pub stage: Stage,
    pub emitter: &'a ProgressEmitter,
}

#[derive(Clone)]
pub struct StreamFetcher {
    transport: Arc<dyn Transport>,
}

impl StreamFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Download the stream to `dest` (overwriting) and return `dest`.
    /// No retry: the first transport failure surfaces as TransferFailed.
    pub async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf, DownloadError> {
        let FetchRequest {
            stream_id,
            dest,
            stage,
            emitter,
        } = request;

        tracing::info!(
            transport = self.transport.name(),
            %stage,
            stream_id,
            dest = %dest.display(),
            "fetching stream"
        );

        let on_event = |event: TransportEvent| {
            if let Some(state) = TransferState::from_event(&event) {
                emitter.progress(stage, &state);
            }
        };

        self.transport
            .transfer(stream_id, dest, &on_event)
            .await
            .map_err(|e| match e {
                DownloadError::TransferFailed { .. } => e,
                other => DownloadError::transfer(stage, other),
            })?;

        Ok(dest.to_path_buf())
    }
}

/// yt-dlp transport bound to one asset URL
pub struct YtDlpTransport {
    url: String,
    ytdlp_path: String,
    network: NetworkConfig,
}

impl YtDlpTransport {
    pub fn new(url: impl Into<String>, network: NetworkConfig) -> Self {
        Self {
            url: url.into(),
            ytdlp_path: ToolManager::new().resolve_or_bare(ToolType::YtDlp),
            network,
        }
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.ytdlp_path = path.into();
        self
    }

    fn build_args(&self, stream_id: &str, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            stream_id.to_string(),
            "-o".to_string(),
            dest.to_string_lossy().to_string(),
            "--force-overwrites".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
            "--progress".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ];
        args.extend(get_timeout_args(&self.network));
        args.extend(get_proxy_args(&self.network));
        args.push(self.url.clone());
        args
    }
}

#[async_trait]
impl Transport for YtDlpTransport {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn transfer(
        &self,
        stream_id: &str,
        dest: &Path,
        on_event: &(dyn Fn(TransportEvent) + Send + Sync),
    ) -> Result<(), DownloadError> {
        let args = self.build_args(stream_id, dest);
        tracing::debug!(program = %self.ytdlp_path, args = %args.join(" "), "spawning yt-dlp");

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::ExecutionError(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = parse_progress_line(&line) {
                on_event(event);
            }
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(DownloadError::ExecutionError(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_summary(&stderr_output)
            )))
        }
    }
}

/// Parse one of our progress-template lines:
/// AVP|downloading|2048|8192|NA|1024.5
pub fn parse_progress_line(line: &str) -> Option<TransportEvent> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"^AVP\|(\w+)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)$"
        ).unwrap();
    }

    let line = line.trim();
    if !line.starts_with(PROGRESS_PREFIX) {
        return None;
    }
    let caps = PROGRESS_RE.captures(line)?;

    Some(TransportEvent {
        status: caps.get(1)?.as_str().to_string(),
        downloaded_bytes: parse_number(caps.get(2)?.as_str()).map(|v| v as u64),
        total_bytes: parse_number(caps.get(3)?.as_str()).map(|v| v as u64),
        total_bytes_estimate: parse_number(caps.get(4)?.as_str()).map(|v| v as u64),
        speed: parse_number(caps.get(5)?.as_str()),
    })
}

// yt-dlp prints "NA" (or "None") for missing fields
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
