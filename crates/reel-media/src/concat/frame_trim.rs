//! Concatenation that drops leading frames at every clip boundary.
//!
//! Generated clips often open on a frame that duplicates the previous clip's
//! last frame. Removing it from every clip after the first hides the stutter.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use reel_models::{ConcatStrategy, EncodingConfig};

use super::{audio_sources, log_progress, probe_clips, ConcatBackend, ConcatOptions};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{frame_trim_graph, frames_to_secs};

#[derive(Debug, Clone)]
pub struct FrameTrimConcat {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
    probe_timeout_secs: u64,
}

impl FrameTrimConcat {
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig, probe_timeout_secs: u64) -> Self {
        Self {
            runner,
            encoding,
            probe_timeout_secs,
        }
    }
}

#[async_trait]
impl ConcatBackend for FrameTrimConcat {
    fn strategy(&self) -> ConcatStrategy {
        ConcatStrategy::FrameTrim
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path, options: &ConcatOptions) -> MediaResult<()> {
        let infos = probe_clips(inputs, self.probe_timeout_secs).await?;
        let fps = infos
            .first()
            .map(|i| i.fps)
            .ok_or(MediaError::NoInputs)?;

        let trimmed = frames_to_secs(options.trim_frames, fps) * (inputs.len() - 1) as f64;
        let expected: f64 = infos.iter().map(|i| i.duration).sum::<f64>() - trimmed;

        let graph = frame_trim_graph(&audio_sources(&infos), options.trim_frames, fps);

        let cmd = FfmpegCommand::with_inputs(inputs, output)?
            .filter_complex(graph)
            .map("[outv]")
            .map("[outa]")
            .encoding(&self.encoding);

        self.runner
            .run_with_progress(&cmd, log_progress(ConcatStrategy::FrameTrim, expected))
            .await
    }
}
