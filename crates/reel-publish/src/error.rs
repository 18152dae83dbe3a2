//! Publish error types.

use std::path::PathBuf;
use thiserror::Error;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Uploader binary not found: {0}")]
    BinaryNotFound(PathBuf),

    /// Non-zero exit; `stderr` is the uploader's raw output.
    #[error("{stderr}")]
    UploadRejected { stderr: String, exit_code: Option<i32> },

    #[error("Uploader timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    pub fn rejected(stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::UploadRejected {
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
