//! Assembly and publish worker.
//!
//! This crate provides:
//! - Collaborator ports with in-memory and Redis implementations
//! - The assembly pipeline (validate, fetch, concatenate, mix, upload)
//! - The publish pipeline (credentials, download, uploader CLI)
//! - A queue executor with retry, DLQ and graceful shutdown

pub mod assembly;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod ports;
pub mod publish;
pub mod redis_store;
pub mod retry;
pub mod scratch;
pub mod tracker;
pub mod validator;

pub use assembly::{AssemblyPipeline, AssemblyStats};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobHandlers};
pub use logging::{init_tracing, JobLogger};
pub use memory::MemoryStore;
pub use ports::{
    AccountRepository, AssemblyTaskRepository, BackgroundTrackCatalog, ChapterVideoSink,
    PublishTaskRepository, ShotLocator,
};
pub use publish::{PublishPipeline, PublishStats};
pub use redis_store::RedisStore;
pub use scratch::{ScratchDir, ScratchFile};
pub use validator::{inspect_shots, validate_shots, ValidationReport};
