//! Chapter assembly pipeline.
//!
//! One run takes a pending assembly task from shot validation through to a
//! stored MP4 attached to its chapter:
//!
//! ```text
//! validating -> downloading_materials -> concatenating -> [mixing] -> uploading -> completed
//! ```
//!
//! The pipeline is the only writer for the task while it runs. Any fatal
//! error marks the task failed with the last progress kept, and the scratch
//! directory is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn, Instrument};

use reel_media::{
    check_ffmpeg, check_ffprobe, probe_duration, AudioMixer, ConcatEngine, ConcatOptions,
    FfmpegRunner, MixOutcome, MixSettings,
};
use reel_models::{
    AssemblySettings, AssemblyStatus, AssemblyTask, AssemblyUpdate, ConcatStrategy, ContentKind,
    TaskId,
};
use reel_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::fetcher::fetch_all;
use crate::logging::JobLogger;
use crate::metrics;
use crate::ports::{AssemblyTaskRepository, BackgroundTrackCatalog, ChapterVideoSink, ShotLocator};
use crate::retry::{retry_async, RetryConfig};
use crate::scratch::ScratchDir;
use crate::tracker::TaskTracker;
use crate::validator::validate_shots;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Summary of a completed assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyStats {
    pub task_id: TaskId,
    pub total_shots: usize,
    pub result_key: String,
    pub duration_secs: u32,
    pub strategy_used: ConcatStrategy,
    /// The requested strategy failed and stream copy produced the output
    pub fell_back: bool,
    /// Background music made it into the output
    pub mixed: bool,
}

/// Turns a chapter's shots into one stored video.
#[derive(Clone)]
pub struct AssemblyPipeline {
    config: WorkerConfig,
    tasks: Arc<dyn AssemblyTaskRepository>,
    shots: Arc<dyn ShotLocator>,
    tracks: Arc<dyn BackgroundTrackCatalog>,
    sink: Arc<dyn ChapterVideoSink>,
    store: Arc<dyn BlobStore>,
    engine: ConcatEngine,
    mixer: AudioMixer,
}

impl AssemblyPipeline {
    pub fn new(
        config: WorkerConfig,
        tasks: Arc<dyn AssemblyTaskRepository>,
        shots: Arc<dyn ShotLocator>,
        tracks: Arc<dyn BackgroundTrackCatalog>,
        sink: Arc<dyn ChapterVideoSink>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let runner = FfmpegRunner::new().with_timeout(config.ffmpeg_timeout.as_secs());
        let probe_secs = config.probe_timeout.as_secs();
        let engine = ConcatEngine::new(runner.clone(), config.encoding.clone(), probe_secs);
        let mixer = AudioMixer::new(runner, config.encoding.clone(), probe_secs);

        Self {
            config,
            tasks,
            shots,
            tracks,
            sink,
            store,
            engine,
            mixer,
        }
    }

    /// Replace the concatenation engine.
    pub fn with_engine(mut self, engine: ConcatEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run a pending assembly task to completion.
    ///
    /// Tasks in any other state are rejected with `InvalidState` and left
    /// untouched; failed tasks go through [`Self::retry_assembly`].
    pub async fn run_assembly(&self, task_id: &TaskId) -> WorkerResult<AssemblyStats> {
        let task = self.tasks.get(task_id).await?;
        if task.status != AssemblyStatus::Pending {
            return Err(WorkerError::invalid_state(format!(
                "assembly task {} is {}, only pending tasks can run",
                task_id, task.status
            )));
        }

        let logger = JobLogger::new(task_id, "assembly");
        let tracker = TaskTracker::new(Arc::clone(&self.tasks), &task);
        logger.log_start(&format!(
            "Assembling chapter {} for user {}",
            task.chapter_id, task.user_id
        ));

        let span = logger.create_span();
        let result = self.execute(&task, &tracker, &logger).instrument(span).await;

        match result {
            Ok(stats) => {
                metrics::record_assembly_run("completed");
                logger.log_completion(&format!(
                    "{} shots -> {} ({}s)",
                    stats.total_shots, stats.result_key, stats.duration_secs
                ));
                Ok(stats)
            }
            Err(e) => {
                metrics::record_assembly_run(e.kind());
                logger.log_error(&e.to_string());
                if let Err(mark_err) = tracker.fail(&e.task_message()).await {
                    warn!(
                        task_id = %task_id,
                        "Failed to mark assembly task failed: {}", mark_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Reset a failed task to pending and run it again.
    pub async fn retry_assembly(&self, task_id: &TaskId) -> WorkerResult<AssemblyStats> {
        let task = self.tasks.get(task_id).await?;
        if task.status != AssemblyStatus::Failed {
            return Err(WorkerError::invalid_state(format!(
                "assembly task {} is {}, only failed tasks can be retried",
                task_id, task.status
            )));
        }

        info!(task_id = %task_id, "Retrying assembly task");
        self.tasks.update(task_id, &AssemblyUpdate::reset()).await?;
        self.run_assembly(task_id).await
    }

    /// Run a task again after its queue message was redelivered.
    ///
    /// A failed task is retried. A task left mid-stage by an earlier attempt is
    /// marked failed first. `None` means the task had already completed.
    pub async fn rerun_assembly(&self, task_id: &TaskId) -> WorkerResult<Option<AssemblyStats>> {
        let task = self.tasks.get(task_id).await?;
        match task.status {
            AssemblyStatus::Completed => {
                info!(task_id = %task_id, "Assembly already completed, nothing to rerun");
                Ok(None)
            }
            AssemblyStatus::Pending => self.run_assembly(task_id).await.map(Some),
            AssemblyStatus::Failed => self.retry_assembly(task_id).await.map(Some),
            stage => {
                warn!(task_id = %task_id, stage = %stage, "Assembly interrupted mid-stage");
                self.tasks
                    .update(
                        task_id,
                        &AssemblyUpdate::failed(format!("interrupted while {stage}")),
                    )
                    .await?;
                self.retry_assembly(task_id).await.map(Some)
            }
        }
    }

    async fn execute(
        &self,
        task: &AssemblyTask,
        tracker: &TaskTracker,
        logger: &JobLogger,
    ) -> WorkerResult<AssemblyStats> {
        // Validating
        let stage_start = Instant::now();
        tracker.enter(AssemblyStatus::Validating).await?;
        logger.log_stage("validating", "Checking chapter shots");

        let chapter = self.shots.chapter_shots(&task.chapter_id).await?;
        if chapter.content_kind != ContentKind::Movie {
            return Err(WorkerError::validation(format!(
                "only movie chapters can be assembled, chapter {} is {}",
                chapter.chapter_id,
                chapter.content_kind.as_str()
            )));
        }
        validate_shots(&chapter.shots)?;
        check_tools()?;

        let keys = chapter
            .shots
            .iter()
            .map(|shot| {
                shot.remote_url
                    .clone()
                    .ok_or_else(|| WorkerError::validation(format!("{}: no video", shot.label())))
            })
            .collect::<WorkerResult<Vec<String>>>()?;
        record_stage("validating", stage_start);

        let scratch = ScratchDir::new(&self.config.work_dir, "assembly_")?;

        // Downloading
        let stage_start = Instant::now();
        tracker.enter(AssemblyStatus::DownloadingMaterials).await?;
        logger.log_stage(
            "downloading_materials",
            &format!(
                "Fetching {} shots ({} at a time)",
                keys.len(),
                self.config.fetch_concurrency
            ),
        );
        let clips = fetch_all(
            self.store.as_ref(),
            &keys,
            scratch.path(),
            self.config.fetch_concurrency,
        )
        .await?;
        record_stage("downloading_materials", stage_start);

        // Concatenating
        let stage_start = Instant::now();
        tracker.enter(AssemblyStatus::Concatenating).await?;
        let options = concat_options(&task.settings);
        logger.log_stage(
            "concatenating",
            &format!("Joining {} clips with {}", clips.len(), options.strategy),
        );
        let joined = scratch.join("concat.mp4");
        let outcome = self.engine.concatenate(&clips, &joined, &options).await?;
        if outcome.fell_back {
            metrics::record_concat_fallback(outcome.requested.as_str());
            logger.log_warning(&format!(
                "{} failed, output produced by {}: {}",
                outcome.requested,
                outcome.strategy_used,
                outcome.fallback_reason.as_deref().unwrap_or("unknown error")
            ));
        }
        record_stage("concatenating", stage_start);

        // Mixing
        let (final_video, mixed) = match task.background_track_id.as_deref() {
            Some(track_id) => {
                let stage_start = Instant::now();
                tracker.enter(AssemblyStatus::Mixing).await?;
                logger.log_stage("mixing", &format!("Mixing background track {track_id}"));
                let outcome = self
                    .mix_background(track_id, &joined, &scratch, &task.settings, logger)
                    .await;
                record_stage("mixing", stage_start);
                let mixed = outcome.was_mixed();
                (outcome.path().to_path_buf(), mixed)
            }
            None => (joined, false),
        };

        // Uploading
        let stage_start = Instant::now();
        tracker.enter(AssemblyStatus::Uploading).await?;
        let file_name = format!("chapter_{}_movie.mp4", task.chapter_id);
        let key = self
            .store
            .generate_key(&task.user_id, &file_name, &self.config.video_prefix);
        logger.log_stage("uploading", &format!("Uploading result to {key}"));

        let retry = RetryConfig::new("upload assembled video");
        let store = &self.store;
        retry_async(&retry, || {
            store.upload_file(&final_video, &key, VIDEO_CONTENT_TYPE)
        })
        .await?;

        let duration_secs = self.probe_seconds(&final_video, logger).await;
        self.sink
            .attach_video(&task.chapter_id, &key, duration_secs)
            .await?;
        tracker.complete(&key, duration_secs).await?;
        record_stage("uploading", stage_start);

        Ok(AssemblyStats {
            task_id: task.id.clone(),
            total_shots: clips.len(),
            result_key: key,
            duration_secs,
            strategy_used: outcome.strategy_used,
            fell_back: outcome.fell_back,
            mixed,
        })
    }

    /// Best-effort background mix. Every failure leaves `video` as the result.
    async fn mix_background(
        &self,
        track_id: &str,
        video: &Path,
        scratch: &ScratchDir,
        settings: &AssemblySettings,
        logger: &JobLogger,
    ) -> MixOutcome {
        let skipped = |reason: String| {
            logger.log_warning(&format!("Background mix skipped: {reason}"));
            metrics::record_mix_skipped();
            MixOutcome::Skipped {
                path: video.to_path_buf(),
                reason,
            }
        };

        let track = match self.tracks.get_by_id(track_id).await {
            Ok(Some(track)) if !track.storage_key.is_empty() => track,
            Ok(_) => return skipped(format!("background track {track_id} not found")),
            Err(e) => return skipped(format!("background track lookup failed: {e}")),
        };

        let track_path: PathBuf = scratch.join(format!("background.{}", track.extension()));
        if let Err(e) = self
            .store
            .download_to_path(&track.storage_key, &track_path)
            .await
        {
            return skipped(format!("failed to fetch {}: {e}", track.storage_key));
        }

        let mix = MixSettings {
            gain: settings.background_gain,
            loop_track: settings.loop_background,
        };
        let outcome = self
            .mixer
            .mix(video, Some(&track_path), &mix, &scratch.join("mixed.mp4"))
            .await;
        if let MixOutcome::Skipped { reason, .. } = &outcome {
            logger.log_warning(&format!("Background mix skipped: {reason}"));
            metrics::record_mix_skipped();
        }
        outcome
    }

    /// Whole seconds of the final video, 0 when it cannot be probed.
    async fn probe_seconds(&self, video: &Path, logger: &JobLogger) -> u32 {
        match probe_duration(video, self.config.probe_timeout.as_secs()).await {
            Ok(secs) if secs.is_finite() && secs > 0.0 => secs as u32,
            Ok(_) => 0,
            Err(e) => {
                logger.log_warning(&format!("Could not probe final duration: {e}"));
                0
            }
        }
    }
}

fn check_tools() -> WorkerResult<()> {
    check_ffmpeg().map_err(|_| WorkerError::validation("FFmpeg is not installed or not on PATH"))?;
    check_ffprobe()
        .map_err(|_| WorkerError::validation("FFprobe is not installed or not on PATH"))?;
    Ok(())
}

fn concat_options(settings: &AssemblySettings) -> ConcatOptions {
    ConcatOptions {
        strategy: settings.strategy,
        trim_frames: settings.trim_frames,
        transition: settings.transition,
    }
}

fn record_stage(stage: &str, started: Instant) {
    metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
}
