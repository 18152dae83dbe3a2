//! Multi-strategy clip concatenation.
//!
//! The engine runs the requested [`ConcatStrategy`]; when a re-encoding
//! strategy fails for any reason it falls back to [`ConcatStrategy::Fast`]
//! exactly once. A Fast failure is final. A single input is copied
//! byte-for-byte without invoking FFmpeg.

mod crossfade;
mod fast;
mod frame_trim;

pub use crossfade::CrossfadeConcat;
pub use fast::FastConcat;
pub use frame_trim::FrameTrimConcat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use reel_models::{ConcatStrategy, EncodingConfig, TransitionSpec};

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::filters::AudioSource;
use crate::fs_utils::{copy_file, move_file, partial_path, remove_quietly};
use crate::progress::FfmpegProgress;
use crate::probe::{probe_video_with_timeout, VideoInfo};

/// Per-run concatenation options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatOptions {
    pub strategy: ConcatStrategy,
    /// Leading frames dropped per clip (frame-trim)
    pub trim_frames: u32,
    /// Transition type and length (crossfade)
    pub transition: TransitionSpec,
}

impl Default for ConcatOptions {
    fn default() -> Self {
        Self {
            strategy: ConcatStrategy::Fast,
            trim_frames: reel_models::strategy::DEFAULT_TRIM_FRAMES,
            transition: TransitionSpec::default(),
        }
    }
}

impl ConcatOptions {
    pub fn new(strategy: ConcatStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

/// Which strategy produced the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatOutcome {
    pub requested: ConcatStrategy,
    pub strategy_used: ConcatStrategy,
    pub fell_back: bool,
    /// Error that triggered the fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// One way of joining clips. Implementations write exactly `output`.
#[async_trait]
pub trait ConcatBackend: Send + Sync {
    fn strategy(&self) -> ConcatStrategy;

    async fn concat(&self, inputs: &[PathBuf], output: &Path, options: &ConcatOptions) -> MediaResult<()>;
}

/// Concatenation engine with fallback to Fast.
#[derive(Clone)]
pub struct ConcatEngine {
    fast: Arc<dyn ConcatBackend>,
    frame_trim: Arc<dyn ConcatBackend>,
    crossfade: Arc<dyn ConcatBackend>,
}

impl ConcatEngine {
    /// Engine backed by FFmpeg with the given runner and output profile.
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig, probe_timeout_secs: u64) -> Self {
        Self {
            fast: Arc::new(FastConcat::new(runner.clone())),
            frame_trim: Arc::new(FrameTrimConcat::new(
                runner.clone(),
                encoding.clone(),
                probe_timeout_secs,
            )),
            crossfade: Arc::new(CrossfadeConcat::new(runner, encoding, probe_timeout_secs)),
        }
    }

    /// Engine with explicit backends.
    pub fn with_backends(
        fast: Arc<dyn ConcatBackend>,
        frame_trim: Arc<dyn ConcatBackend>,
        crossfade: Arc<dyn ConcatBackend>,
    ) -> Self {
        Self {
            fast,
            frame_trim,
            crossfade,
        }
    }

    fn backend(&self, strategy: ConcatStrategy) -> &Arc<dyn ConcatBackend> {
        match strategy {
            ConcatStrategy::Fast => &self.fast,
            ConcatStrategy::FrameTrim => &self.frame_trim,
            ConcatStrategy::Crossfade => &self.crossfade,
        }
    }

    /// Join `inputs` in order into `output`.
    pub async fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &ConcatOptions,
    ) -> MediaResult<ConcatOutcome> {
        if inputs.is_empty() {
            return Err(MediaError::NoInputs);
        }
        if let Some(missing) = inputs.iter().find(|p| !p.exists()) {
            return Err(MediaError::FileNotFound(missing.clone()));
        }

        let requested = options.strategy;

        if inputs.len() == 1 {
            debug!("Single clip, copying without FFmpeg");
            copy_file(&inputs[0], output).await?;
            return Ok(ConcatOutcome {
                requested,
                strategy_used: ConcatStrategy::Fast,
                fell_back: false,
                fallback_reason: None,
            });
        }

        info!(
            strategy = %requested,
            clips = inputs.len(),
            "Concatenating clips"
        );

        match self.attempt(requested, inputs, output, options).await {
            Ok(()) => Ok(ConcatOutcome {
                requested,
                strategy_used: requested,
                fell_back: false,
                fallback_reason: None,
            }),
            Err(e) if requested != ConcatStrategy::Fast => {
                warn!(
                    strategy = %requested,
                    error = %e,
                    "Concatenation strategy failed, falling back to fast"
                );
                self.attempt(ConcatStrategy::Fast, inputs, output, options)
                    .await?;
                Ok(ConcatOutcome {
                    requested,
                    strategy_used: ConcatStrategy::Fast,
                    fell_back: true,
                    fallback_reason: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Run one strategy into a partial file and move it into place on success.
    async fn attempt(
        &self,
        strategy: ConcatStrategy,
        inputs: &[PathBuf],
        output: &Path,
        options: &ConcatOptions,
    ) -> MediaResult<()> {
        let partial = partial_path(output);
        let backend = self.backend(strategy);
        debug!(backend = %backend.strategy(), output = %partial.display(), "Running concat backend");
        let result = backend.concat(inputs, &partial, options).await;

        match result {
            Ok(()) if partial.exists() => move_file(&partial, output).await,
            Ok(()) => Err(MediaError::internal(format!(
                "{strategy} concatenation produced no output"
            ))),
            Err(e) => {
                remove_quietly(&partial).await;
                Err(e)
            }
        }
    }
}

/// Probe every clip in order.
pub(crate) async fn probe_clips(inputs: &[PathBuf], timeout_secs: u64) -> MediaResult<Vec<VideoInfo>> {
    let mut infos = Vec::with_capacity(inputs.len());
    for input in inputs {
        infos.push(probe_video_with_timeout(input, timeout_secs).await?);
    }
    Ok(infos)
}

/// Audio source per clip: its own stream, or silence of its length.
pub(crate) fn audio_sources(infos: &[VideoInfo]) -> Vec<AudioSource> {
    infos
        .iter()
        .map(|info| {
            if info.has_audio {
                AudioSource::Stream
            } else {
                AudioSource::Silence(info.duration)
            }
        })
        .collect()
}

/// Progress logger for a re-encode of `expected_secs` of output.
pub(crate) fn log_progress(
    strategy: ConcatStrategy,
    expected_secs: f64,
) -> impl Fn(FfmpegProgress) + Send + 'static {
    let total_ms = (expected_secs * 1000.0) as i64;
    move |progress| {
        debug!(
            strategy = %strategy,
            percent = format!("{:.1}", progress.percentage(total_ms)),
            speed = progress.speed,
            "Encoding progress"
        );
    }
}
