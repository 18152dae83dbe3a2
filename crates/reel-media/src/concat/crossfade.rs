//! Cross-dissolve concatenation using chained `xfade` filters.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use reel_models::{ConcatStrategy, EncodingConfig, TransitionSpec};

use super::{audio_sources, log_progress, probe_clips, ConcatBackend, ConcatOptions};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{clamp_transition, crossfade_duration, crossfade_graph};

#[derive(Debug, Clone)]
pub struct CrossfadeConcat {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
    probe_timeout_secs: u64,
}

impl CrossfadeConcat {
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig, probe_timeout_secs: u64) -> Self {
        Self {
            runner,
            encoding,
            probe_timeout_secs,
        }
    }
}

#[async_trait]
impl ConcatBackend for CrossfadeConcat {
    fn strategy(&self) -> ConcatStrategy {
        ConcatStrategy::Crossfade
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path, options: &ConcatOptions) -> MediaResult<()> {
        let infos = probe_clips(inputs, self.probe_timeout_secs).await?;
        let durations: Vec<f64> = infos.iter().map(|i| i.duration).collect();
        let fps = infos.first().map(|i| i.fps).ok_or(MediaError::NoInputs)?;

        let duration = clamp_transition(options.transition.duration_secs, &durations, fps);
        if duration <= 0.0 {
            return Err(MediaError::invalid_graph(
                "transition duration must be positive and shorter than every clip",
            ));
        }
        if duration < options.transition.duration_secs {
            debug!(
                requested = options.transition.duration_secs,
                used = duration,
                "Transition clamped below shortest clip"
            );
        }
        let transition = TransitionSpec::new(options.transition.kind, duration);

        let graph = crossfade_graph(&durations, &audio_sources(&infos), &transition, fps);
        let expected = crossfade_duration(&durations, duration);

        let cmd = FfmpegCommand::with_inputs(inputs, output)?
            .filter_complex(graph)
            .map("[outv]")
            .map("[outa]")
            .encoding(&self.encoding);

        self.runner
            .run_with_progress(&cmd, log_progress(ConcatStrategy::Crossfade, expected))
            .await
    }
}
