//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reel_media::{DEFAULT_FFMPEG_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_SECS};
use reel_models::EncodingConfig;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent shot downloads within one assembly
    pub fetch_concurrency: usize,
    /// Hard timeout for one FFmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Hard timeout for one ffprobe invocation
    pub probe_timeout: Duration,
    /// Output encoding profile for re-encoding strategies and the mixer
    pub encoding: EncodingConfig,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root for per-run scratch directories
    pub work_dir: PathBuf,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Storage key prefix for finished videos
    pub video_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            fetch_concurrency: 5,
            ffmpeg_timeout: Duration::from_secs(DEFAULT_FFMPEG_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            encoding: EncodingConfig::default(),
            shutdown_timeout: Duration::from_secs(60),
            work_dir: std::env::temp_dir().join("reel"),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(1800),
            video_prefix: "videos".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut encoding = defaults.encoding.clone();
        if let Ok(preset) = std::env::var("WORKER_X264_PRESET") {
            encoding = encoding.with_preset(preset);
        }
        let crf = env_or("WORKER_X264_CRF", encoding.crf);
        encoding = encoding.with_crf(crf);

        Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", defaults.max_concurrent_jobs).max(1),
            fetch_concurrency: env_or("WORKER_FETCH_CONCURRENCY", defaults.fetch_concurrency).max(1),
            ffmpeg_timeout: Duration::from_secs(env_or(
                "WORKER_FFMPEG_TIMEOUT_SECS",
                defaults.ffmpeg_timeout.as_secs(),
            )),
            probe_timeout: Duration::from_secs(env_or(
                "WORKER_PROBE_TIMEOUT_SECS",
                defaults.probe_timeout.as_secs(),
            )),
            encoding,
            shutdown_timeout: Duration::from_secs(env_or(
                "WORKER_SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout.as_secs(),
            )),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            claim_interval: Duration::from_secs(env_or(
                "WORKER_CLAIM_INTERVAL_SECS",
                defaults.claim_interval.as_secs(),
            )),
            claim_min_idle: Duration::from_secs(env_or(
                "WORKER_CLAIM_MIN_IDLE_SECS",
                defaults.claim_min_idle.as_secs(),
            )),
            video_prefix: std::env::var("WORKER_VIDEO_PREFIX").unwrap_or(defaults.video_prefix),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }
}
