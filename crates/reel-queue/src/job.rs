//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reel_models::TaskId;

/// Job to assemble a chapter's shots into one video.
///
/// The assembly task itself is created upstream; the job only carries its id.
/// `retry` asks the worker to reset a FAILED task before running it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembleChapterJob {
    /// Unique job ID
    pub job_id: String,
    /// User ID
    pub user_id: String,
    /// Assembly task to run
    pub task_id: TaskId,
    /// Reset a FAILED task before running
    #[serde(default)]
    pub retry: bool,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl AssembleChapterJob {
    pub fn new(user_id: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            task_id,
            retry: false,
            created_at: Utc::now(),
        }
    }

    /// Mark this job as a retry of a failed task.
    pub fn as_retry(mut self) -> Self {
        self.retry = true;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("assemble:{}:{}", self.user_id, self.task_id)
    }
}

/// Job to publish an assembled video to the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishVideoJob {
    /// Unique job ID
    pub job_id: String,
    /// User ID
    pub user_id: String,
    /// Publish task to run
    pub task_id: TaskId,
    /// Reset a FAILED task before running
    #[serde(default)]
    pub retry: bool,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl PublishVideoJob {
    pub fn new(user_id: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            task_id,
            retry: false,
            created_at: Utc::now(),
        }
    }

    /// Mark this job as a retry of a failed task.
    pub fn as_retry(mut self) -> Self {
        self.retry = true;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("publish:{}:{}", self.user_id, self.task_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    AssembleChapter(AssembleChapterJob),
    PublishVideo(PublishVideoJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &str {
        match self {
            QueueJob::AssembleChapter(j) => &j.job_id,
            QueueJob::PublishVideo(j) => &j.job_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            QueueJob::AssembleChapter(j) => &j.user_id,
            QueueJob::PublishVideo(j) => &j.user_id,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            QueueJob::AssembleChapter(j) => &j.task_id,
            QueueJob::PublishVideo(j) => &j.task_id,
        }
    }

    pub fn is_retry(&self) -> bool {
        match self {
            QueueJob::AssembleChapter(j) => j.retry,
            QueueJob::PublishVideo(j) => j.retry,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::AssembleChapter(j) => j.idempotency_key(),
            QueueJob::PublishVideo(j) => j.idempotency_key(),
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::AssembleChapter(_) => "assemble",
            QueueJob::PublishVideo(_) => "publish",
        }
    }
}
