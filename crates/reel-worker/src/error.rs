//! Worker error types.

use thiserror::Error;

use reel_publish::PublishError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Preconditions that fail before any resource is allocated.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The task is not in a state this operation accepts.
    #[error("Invalid task state: {0}")]
    InvalidState(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Failed to fetch shot #{position} ({key}): {source}")]
    Fetch {
        position: usize,
        key: String,
        #[source]
        source: reel_storage::StorageError,
    },

    #[error("No usable credentials: {0}")]
    Credentials(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Model error: {0}")]
    Model(#[from] reel_models::ModelError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound(id.into())
    }

    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Message stored on the failed task.
    ///
    /// Uploader rejections keep the uploader's stderr verbatim.
    pub fn task_message(&self) -> String {
        match self {
            WorkerError::Publish(PublishError::UploadRejected { stderr, .. }) => stderr.clone(),
            other => other.to_string(),
        }
    }

    /// Errors that happened before the task was touched and may succeed on redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::Repository(_) | WorkerError::Redis(_) | WorkerError::Queue(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Validation(_) => "validation",
            WorkerError::InvalidState(_) => "invalid_state",
            WorkerError::TaskNotFound(_) => "not_found",
            WorkerError::Fetch { .. } => "fetch",
            WorkerError::Credentials(_) => "credentials",
            WorkerError::Repository(_) | WorkerError::Redis(_) => "repository",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Publish(_) => "upload",
            WorkerError::Storage(_) => "storage",
            WorkerError::Media(_) => "media",
            WorkerError::Model(_) => "model",
            WorkerError::Queue(_) => "queue",
            WorkerError::Json(_) | WorkerError::Io(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_message_keeps_raw_stderr() {
        let err = WorkerError::from(PublishError::rejected("error: -101 account not logged in\n", Some(1)));
        assert_eq!(err.task_message(), "error: -101 account not logged in\n");

        let err = WorkerError::validation("no shots");
        assert_eq!(err.task_message(), "Validation failed: no shots");
    }

    #[test]
    fn test_retryable() {
        assert!(WorkerError::repository("connection reset").is_retryable());
        assert!(!WorkerError::validation("x").is_retryable());
        assert!(!WorkerError::from(PublishError::Timeout(5)).is_retryable());
    }
}
