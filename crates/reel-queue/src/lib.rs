//! Redis Streams job queue.
//!
//! This crate provides:
//! - Assembly and publish job types
//! - Job enqueueing with per-task deduplication
//! - Consumer-group consumption with retry counting, DLQ and idle-job claiming

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{AssembleChapterJob, PublishVideoJob, QueueJob};
pub use queue::{decode_entry, JobQueue, QueueConfig, DEDUP_TTL_SECS};
