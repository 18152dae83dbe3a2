//! Background music mixing.
//!
//! Mixing is best-effort: any failure leaves the original video in place and
//! is reported as [`MixOutcome::Skipped`] rather than an error.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use reel_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::{background_only_graph, loop_count, mix_graph};
use crate::fs_utils::remove_quietly;
use crate::probe::{probe_duration, probe_video_with_timeout};

/// Default background volume relative to the original audio.
pub const DEFAULT_MIX_GAIN: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSettings {
    /// Background volume multiplier
    pub gain: f64,
    /// Repeat the track when it is shorter than the video
    pub loop_track: bool,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            gain: DEFAULT_MIX_GAIN,
            loop_track: true,
        }
    }
}

/// Result of a mix attempt. Both variants carry the video to use next.
#[derive(Debug, Clone, PartialEq)]
pub enum MixOutcome {
    Mixed { path: PathBuf },
    Skipped { path: PathBuf, reason: String },
}

impl MixOutcome {
    pub fn path(&self) -> &Path {
        match self {
            MixOutcome::Mixed { path } | MixOutcome::Skipped { path, .. } => path,
        }
    }

    pub fn was_mixed(&self) -> bool {
        matches!(self, MixOutcome::Mixed { .. })
    }
}

/// Mixes a background track under a finished video.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
    probe_timeout_secs: u64,
}

impl AudioMixer {
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig, probe_timeout_secs: u64) -> Self {
        Self {
            runner,
            encoding,
            probe_timeout_secs,
        }
    }

    /// Mix `track` under `video` into `output`.
    ///
    /// Never fails: on any problem the original `video` path is returned.
    pub async fn mix(
        &self,
        video: &Path,
        track: Option<&Path>,
        settings: &MixSettings,
        output: &Path,
    ) -> MixOutcome {
        let Some(track) = track else {
            return MixOutcome::Skipped {
                path: video.to_path_buf(),
                reason: "no background track".to_string(),
            };
        };

        match self.try_mix(video, track, settings, output).await {
            Ok(()) => {
                info!(output = %output.display(), "Background music mixed");
                MixOutcome::Mixed {
                    path: output.to_path_buf(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Background mix failed, keeping original audio");
                remove_quietly(output).await;
                MixOutcome::Skipped {
                    path: video.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_mix(&self, video: &Path, track: &Path, settings: &MixSettings, output: &Path) -> MediaResult<()> {
        let info = probe_video_with_timeout(video, self.probe_timeout_secs).await?;
        let track_secs = probe_duration(track, self.probe_timeout_secs).await?;

        let plays = if settings.loop_track {
            loop_count(info.duration, track_secs)
        } else {
            1
        };

        let mut cmd = FfmpegCommand::new(video, output).add_input(track);
        if plays > 1 {
            cmd = cmd.stream_loop(plays - 1);
        }

        let graph = if info.has_audio {
            mix_graph(settings.gain)
        } else {
            background_only_graph(settings.gain, info.duration)
        };

        let cmd = cmd
            .filter_complex(graph)
            .map("0:v")
            .map("[aout]")
            .copy_video()
            .output_args(self.encoding.audio_args())
            .duration(info.duration)
            .output_args(self.encoding.container_args());

        self.runner.run(&cmd).await
    }
}
