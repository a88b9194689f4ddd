// Orchestrator - sequences fetches and the merge for the two user operations

use std::path::PathBuf;
use std::sync::Arc;

use super::catalog::Session;
use super::errors::DownloadError;
use super::fetcher::{FetchRequest, StreamFetcher, YtDlpTransport};
use super::merge::MergeEngine;
use super::models::{Combination, DownloaderConfig, Format, Stage, Status};
use super::traits::{ProgressEmitter, Transport};

pub struct Downloader {
    fetcher: StreamFetcher,
    merger: MergeEngine,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, merger: MergeEngine, config: DownloaderConfig) -> Self {
        Self {
            fetcher: StreamFetcher::new(transport),
            merger,
            config,
        }
    }

    /// yt-dlp transport for `url`, ffmpeg remux with command fallback
    pub fn for_url(url: &str, config: DownloaderConfig) -> Self {
        let transport = Arc::new(YtDlpTransport::new(url, config.network.clone()));
        let merger = MergeEngine::ffmpeg().with_ticker(config.ticker);
        Self::new(transport, merger, config)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// `{audio_dir}/{title}_{abr}kbps.{ext}`
    pub fn audio_output_path(&self, session: &Session, option: &Format) -> PathBuf {
        self.config.audio_dir.join(format!(
            "{}_{}kbps.{}",
            session.title(),
            option.bitrate(),
            option.ext
        ))
    }

    /// `{video_dir}/{title}_{height}p[_{abr}kbps].{ext_video}`
    pub fn video_output_path(&self, session: &Session, combination: &Combination) -> PathBuf {
        self.config.video_dir.join(format!(
            "{}_{}.{}",
            session.title(),
            combination.quality_descriptor(),
            combination.ext_video
        ))
    }

    pub async fn download_audio_only(
        &self,
        session: &Session,
        option: &Format,
        emitter: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        self.config.create_dirs().await?;
        let output = self.audio_output_path(session, option);

        emitter.status(Stage::Audio, Status::Downloading);
        self.fetcher
            .fetch(FetchRequest {
                stream_id: &option.format_id,
                dest: &output,
                stage: Stage::Audio,
                emitter,
            })
            .await?;
        emitter.status(Stage::Audio, Status::Completed);

        Ok(output)
    }

    pub async fn download_video_with_audio(
        &self,
        session: &Session,
        combination: &Combination,
        emitter: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        self.config.create_dirs().await?;
        let output = self.video_output_path(session, combination);

        let Some(audio) = &combination.audio else {
            // Nothing to merge: the video stream is the final file
            emitter.status(Stage::Video, Status::Downloading);
            self.fetcher
                .fetch(FetchRequest {
                    stream_id: &combination.video.format_id,
                    dest: &output,
                    stage: Stage::Video,
                    emitter,
                })
                .await?;
            emitter.status(Stage::Video, Status::Completed);
            return Ok(output);
        };

        let video_temp = self
            .config
            .temp_dir
            .join(format!("{}.video.{}", session.title(), combination.ext_video));
        let audio_temp = self
            .config
            .temp_dir
            .join(format!("{}.audio.{}", session.title(), audio.ext));
        let _scratch = ScratchFiles::new(
            vec![video_temp.clone(), audio_temp.clone()],
            self.config.keep_temp_files,
        );

        emitter.status(Stage::Video, Status::Downloading);
        self.fetcher
            .fetch(FetchRequest {
                stream_id: &combination.video.format_id,
                dest: &video_temp,
                stage: Stage::Video,
                emitter,
            })
            .await?;
        emitter.status(Stage::Video, Status::Completed);

        emitter.status(Stage::Audio, Status::Downloading);
        self.fetcher
            .fetch(FetchRequest {
                stream_id: &audio.format_id,
                dest: &audio_temp,
                stage: Stage::Audio,
                emitter,
            })
            .await?;
        emitter.status(Stage::Audio, Status::Completed);

        emitter.status(Stage::Merge, Status::Merging);
        self.merger
            .merge(&video_temp, &audio_temp, &output, emitter)
            .await?;
        emitter.status(Stage::Merge, Status::Completed);

        Ok(output)
    }
}

/// Scratch files removed when the operation returns, successful or not
struct ScratchFiles {
    paths: Vec<PathBuf>,
    keep: bool,
}

impl ScratchFiles {
    fn new(paths: Vec<PathBuf>, keep: bool) -> Self {
        Self { paths, keep }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed scratch file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
            }
        }
    }
}
