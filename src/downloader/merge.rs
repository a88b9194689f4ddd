// Merge engine - stream-copy remux of video + audio with a fallback binding
//
// The merge progress shown to the caller is synthetic: ffmpeg gives no useful
// progress for a stream copy, so a ticker walks 0..=100 on a fixed cadence
// while the remux runs. The ticker is joined before merge() returns.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command as TokioCommand;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::errors::DownloadError;
use super::models::{Stage, TickerConfig, TransferState};
use super::tools::{ToolManager, ToolType};
use super::traits::{ProgressEmitter, RemuxBinding};
use super::utils::{run_output_with_timeout, stderr_summary};

/// Upper bound for a single stream-copy run
const REMUX_TIMEOUT_SECS: u64 = 3600;

/// Primary binding: the resolved ffmpeg install, fully quiet, output captured
pub struct FfmpegPipeline {
    ffmpeg_path: Option<String>,
    timeout_secs: u64,
}

impl FfmpegPipeline {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: ToolManager::new().resolve(ToolType::Ffmpeg).ok(),
            timeout_secs: REMUX_TIMEOUT_SECS,
        }
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "quiet".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemuxBinding for FfmpegPipeline {
    fn name(&self) -> &'static str {
        "ffmpeg-pipeline"
    }

    async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let ffmpeg = self
            .ffmpeg_path
            .as_deref()
            .ok_or_else(|| DownloadError::ToolNotFound("ffmpeg".to_string()))?;

        let out = run_output_with_timeout(
            ffmpeg,
            Self::build_args(video, audio, output),
            self.timeout_secs,
        )
        .await?;

        if out.status.success() {
            Ok(())
        } else {
            Err(DownloadError::ExecutionError(format!(
                "ffmpeg exited with {}: {}",
                out.status,
                stderr_summary(&out.stderr)
            )))
        }
    }
}

/// Fallback binding: plain `ffmpeg` from PATH with per-stream copy flags
pub struct FfmpegCommand {
    program: String,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self {
            program: ToolType::Ffmpeg.as_str().to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemuxBinding for FfmpegCommand {
    fn name(&self) -> &'static str {
        "ffmpeg-command"
    }

    async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let status = TokioCommand::new(&self.program)
            .args(Self::build_args(video, audio, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Failed to start {}: {}", self.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(DownloadError::ExecutionError(format!(
                "{} exited with {}",
                self.program, status
            )))
        }
    }
}

pub struct MergeEngine {
    primary: Arc<dyn RemuxBinding>,
    fallback: Arc<dyn RemuxBinding>,
    ticker: TickerConfig,
}

impl MergeEngine {
    pub fn new(primary: Arc<dyn RemuxBinding>, fallback: Arc<dyn RemuxBinding>) -> Self {
        Self {
            primary,
            fallback,
            ticker: TickerConfig::default(),
        }
    }

    /// ffmpeg pipeline first, plain ffmpeg command second
    pub fn ffmpeg() -> Self {
        Self::new(Arc::new(FfmpegPipeline::new()), Arc::new(FfmpegCommand::new()))
    }

    pub fn with_ticker(mut self, ticker: TickerConfig) -> Self {
        self.ticker = ticker;
        self
    }

    /// Combine `video` and `audio` into `output` without re-encoding
    pub async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        emitter: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        let (started_tx, started_rx) = oneshot::channel();
        let ticker = spawn_ticker(self.ticker, emitter.clone(), started_tx);
        // the ticker has emitted its first tick before the remux starts
        let _ = started_rx.await;

        let result = self.remux_with_fallback(video, audio, output).await;

        if let Err(e) = ticker.await {
            tracing::warn!(error = %e, "merge progress ticker aborted");
        }

        result.map(|_| output.to_path_buf())
    }

    async fn remux_with_fallback(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), DownloadError> {
        let primary_err = match self.primary.remux(video, audio, output).await {
            Ok(()) => {
                tracing::info!(binding = self.primary.name(), output = %output.display(), "remux done");
                return Ok(());
            }
            Err(e) => e,
        };

        tracing::warn!(
            binding = self.primary.name(),
            error = %primary_err,
            fallback = self.fallback.name(),
            "primary remux failed, trying fallback"
        );

        match self.fallback.remux(video, audio, output).await {
            Ok(()) => {
                tracing::info!(binding = self.fallback.name(), output = %output.display(), "remux done");
                Ok(())
            }
            Err(fallback_err) => Err(DownloadError::MergeFailed {
                primary: primary_err.to_string(),
                fallback: fallback_err.to_string(),
            }),
        }
    }
}

/// Emit merge ticks 0, step, 2*step, ... 100, sleeping `interval` between them
fn spawn_ticker(
    config: TickerConfig,
    emitter: ProgressEmitter,
    started: oneshot::Sender<()>,
) -> JoinHandle<()> {
    let step = config.step.max(1);

    tokio::spawn(async move {
        let mut percent: u8 = 0;
        let mut started = Some(started);
        loop {
            emitter.progress(Stage::Merge, &TransferState::processing(percent));
            if let Some(tx) = started.take() {
                let _ = tx.send(());
            }
            if percent >= 100 {
                break;
            }
            tokio::time::sleep(config.interval).await;
            percent = percent.saturating_add(step).min(100);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::TransferPhase;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes the output file unless told to fail
    struct FakeBinding {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeBinding {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemuxBinding for FakeBinding {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn remux(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<(), DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DownloadError::ExecutionError("simulated failure".to_string()));
            }
            tokio::fs::write(output, b"merged").await?;
            Ok(())
        }
    }

    fn fast_ticker() -> TickerConfig {
        TickerConfig {
            step: 2,
            interval: Duration::from_millis(1),
        }
    }

    type Seen = Arc<Mutex<Vec<(Stage, TransferState)>>>;

    fn recording_emitter() -> (ProgressEmitter, Seen) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let emitter = ProgressEmitter::new()
            .on_progress(move |stage, state| sink.lock().unwrap().push((stage, state.clone())));
        (emitter, seen)
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let primary = FakeBinding::new(false);
        let fallback = FakeBinding::new(false);
        let engine = MergeEngine::new(primary.clone(), fallback.clone()).with_ticker(fast_ticker());

        let path = engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &ProgressEmitter::new())
            .await
            .unwrap();

        assert_eq!(path, output);
        assert!(output.exists());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_runs_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let fallback = FakeBinding::new(false);
        let engine = MergeEngine::new(FakeBinding::new(true), fallback.clone()).with_ticker(fast_ticker());

        engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &ProgressEmitter::new())
            .await
            .unwrap();

        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_both_bindings_failing_is_merge_failed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let engine = MergeEngine::new(FakeBinding::new(true), FakeBinding::new(true)).with_ticker(fast_ticker());

        let err = engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &ProgressEmitter::new())
            .await
            .unwrap_err();

        match err {
            DownloadError::MergeFailed { primary, fallback } => {
                assert!(primary.contains("simulated failure"));
                assert!(fallback.contains("simulated failure"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ticker_runs_to_completion_before_return() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let (emitter, seen) = recording_emitter();
        let engine = MergeEngine::new(FakeBinding::new(false), FakeBinding::new(false)).with_ticker(fast_ticker());

        engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &emitter)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let percents: Vec<f64> = seen.iter().map(|(_, s)| s.percent).collect();
        let expected: Vec<f64> = (0..=100).step_by(2).map(|p| p as f64).collect();
        assert_eq!(percents, expected);
        assert!(seen
            .iter()
            .all(|(stage, s)| *stage == Stage::Merge && s.phase == TransferPhase::Processing));
    }

    /// Records how many ticks had been emitted when remux was entered
    struct ObservingBinding {
        seen: Seen,
        ticks_at_entry: AtomicUsize,
    }

    #[async_trait]
    impl RemuxBinding for ObservingBinding {
        fn name(&self) -> &'static str {
            "observing"
        }

        async fn remux(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<(), DownloadError> {
            let ticks = self.seen.lock().unwrap().len();
            self.ticks_at_entry.store(ticks, Ordering::SeqCst);
            tokio::fs::write(output, b"merged").await?;
            Ok(())
        }
    }

    /// Outlives the ticker
    struct SlowBinding {
        delay: Duration,
        done: AtomicBool,
    }

    #[async_trait]
    impl RemuxBinding for SlowBinding {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn remux(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<(), DownloadError> {
            tokio::time::sleep(self.delay).await;
            tokio::fs::write(output, b"merged").await?;
            self.done.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_tick_precedes_remux() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let (emitter, seen) = recording_emitter();
        let primary = Arc::new(ObservingBinding {
            seen: seen.clone(),
            ticks_at_entry: AtomicUsize::new(0),
        });
        let engine = MergeEngine::new(primary.clone(), FakeBinding::new(false)).with_ticker(TickerConfig {
            step: 10,
            interval: Duration::from_millis(20),
        });

        engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &emitter)
            .await
            .unwrap();

        assert!(primary.ticks_at_entry.load(Ordering::SeqCst) >= 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, Stage::Merge);
        assert_eq!(seen[0].1.percent, 0.0);
    }

    #[tokio::test]
    async fn test_merge_waits_for_slow_remux() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let (emitter, seen) = recording_emitter();
        let primary = Arc::new(SlowBinding {
            delay: Duration::from_millis(150),
            done: AtomicBool::new(false),
        });
        let engine = MergeEngine::new(primary.clone(), FakeBinding::new(false)).with_ticker(TickerConfig {
            step: 50,
            interval: Duration::from_millis(1),
        });

        engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &emitter)
            .await
            .unwrap();

        assert!(primary.done.load(Ordering::SeqCst));
        assert!(output.exists());
        let percents: Vec<f64> = seen.lock().unwrap().iter().map(|(_, s)| s.percent).collect();
        assert_eq!(percents, vec![0.0, 50.0, 100.0]);
    }

    #[tokio::test]
    async fn test_merge_waits_for_slow_ticker() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let (emitter, seen) = recording_emitter();
        let engine = MergeEngine::new(FakeBinding::new(false), FakeBinding::new(false)).with_ticker(TickerConfig {
            step: 25,
            interval: Duration::from_millis(20),
        });

        engine
            .merge(Path::new("v.mp4"), Path::new("a.m4a"), &output, &emitter)
            .await
            .unwrap();

        // no tick may arrive after merge has returned
        let percents: Vec<f64> = seen.lock().unwrap().iter().map(|(_, s)| s.percent).collect();
        assert_eq!(percents, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[tokio::test]
    async fn test_ticker_clamps_uneven_step() {
        let (emitter, seen) = recording_emitter();
        let (tx, _rx) = oneshot::channel();
        let config = TickerConfig {
            step: 30,
            interval: Duration::from_millis(1),
        };

        spawn_ticker(config, emitter, tx).await.unwrap();

        let percents: Vec<f64> = seen.lock().unwrap().iter().map(|(_, s)| s.percent).collect();
        assert_eq!(percents, vec![0.0, 30.0, 60.0, 90.0, 100.0]);
    }

    #[test]
    fn test_copy_args() {
        let pipeline = FfmpegPipeline::build_args(Path::new("v.mp4"), Path::new("a.m4a"), Path::new("o.mp4"));
        assert!(pipeline.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(pipeline.last().unwrap(), "o.mp4");

        let command = FfmpegCommand::build_args(Path::new("v.mp4"), Path::new("a.m4a"), Path::new("o.mp4"));
        assert_eq!(
            command,
            vec!["-y", "-i", "v.mp4", "-i", "a.m4a", "-c:v", "copy", "-c:a", "copy", "o.mp4"]
        );
    }

    #[tokio::test]
    async fn test_missing_primary_binary_is_tool_not_found() {
        let pipeline = FfmpegPipeline {
            ffmpeg_path: None,
            timeout_secs: 1,
        };
        let err = pipeline
            .remux(Path::new("v"), Path::new("a"), Path::new("o"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));
    }
}
