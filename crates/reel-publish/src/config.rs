//! Uploader configuration.

use std::path::PathBuf;

/// Default hard timeout for one upload.
pub const DEFAULT_UPLOADER_TIMEOUT_SECS: u64 = 1800;

/// Where the uploader binary and account cookie files live.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Uploader executable
    pub binary_path: PathBuf,
    /// Directory holding `{account_id}.json` cookie files
    pub cookie_dir: PathBuf,
    /// Hard timeout for one upload
    pub timeout_secs: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from(default_binary()),
            cookie_dir: PathBuf::from("./data/uploader_cookies"),
            timeout_secs: DEFAULT_UPLOADER_TIMEOUT_SECS,
        }
    }
}

fn default_binary() -> &'static str {
    if cfg!(windows) {
        "./bin/biliup.exe"
    } else {
        "./bin/biliup"
    }
}

impl UploaderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            binary_path: std::env::var("UPLOADER_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.binary_path),
            cookie_dir: std::env::var("UPLOADER_COOKIE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cookie_dir),
            timeout_secs: std::env::var("UPLOADER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Cookie file for an account.
    pub fn cookie_path_for(&self, account_id: &str) -> PathBuf {
        self.cookie_dir.join(format!("{account_id}.json"))
    }

    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = path.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}
