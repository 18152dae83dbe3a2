//! FFmpeg CLI wrapper for clip assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with hard timeouts
//! - Progress parsing from `-progress pipe:2`
//! - FFprobe media inspection
//! - Multi-strategy clip concatenation with fallback
//! - Best-effort background music mixing

pub mod command;
pub mod concat;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod mix;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner, DEFAULT_FFMPEG_TIMEOUT_SECS};
pub use concat::{ConcatBackend, ConcatEngine, ConcatOptions, ConcatOutcome};
pub use error::{MediaError, MediaResult};
pub use mix::{AudioMixer, MixOutcome, MixSettings};
pub use probe::{probe_duration, probe_video, probe_video_with_timeout, VideoInfo, DEFAULT_PROBE_TIMEOUT_SECS};
pub use progress::FfmpegProgress;
