//! Collaborator interfaces consumed by the pipelines.
//!
//! Task rows, chapter shots, background tracks and publish accounts live
//! outside the worker. Each trait is implemented in memory (`memory`) and
//! over Redis (`redis_store`).

use async_trait::async_trait;

use reel_models::{
    AssemblyTask, AssemblyUpdate, BackgroundTrack, ChapterShots, PublishAccount, PublishTask,
    PublishUpdate, TaskId,
};

use crate::error::WorkerResult;

/// Assembly task rows. `update` is atomic per call and enforces the transition table.
#[async_trait]
pub trait AssemblyTaskRepository: Send + Sync {
    async fn get(&self, id: &TaskId) -> WorkerResult<AssemblyTask>;

    /// Apply `update` and return the stored task.
    async fn update(&self, id: &TaskId, update: &AssemblyUpdate) -> WorkerResult<AssemblyTask>;
}

/// Publish task rows. `update` is atomic per call and enforces the transition table.
#[async_trait]
pub trait PublishTaskRepository: Send + Sync {
    async fn get(&self, id: &TaskId) -> WorkerResult<PublishTask>;

    async fn update(&self, id: &TaskId, update: &PublishUpdate) -> WorkerResult<PublishTask>;
}

/// Finds the produced clips for a chapter.
#[async_trait]
pub trait ShotLocator: Send + Sync {
    /// Shots in playback order.
    async fn chapter_shots(&self, chapter_id: &str) -> WorkerResult<ChapterShots>;
}

#[async_trait]
pub trait BackgroundTrackCatalog: Send + Sync {
    async fn get_by_id(&self, id: &str) -> WorkerResult<Option<BackgroundTrack>>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, id: &str) -> WorkerResult<Option<PublishAccount>>;

    async fn list_for_user(&self, user_id: &str) -> WorkerResult<Vec<PublishAccount>>;

    /// Make `account_id` the user's default and clear the flag on the others.
    async fn set_default(&self, user_id: &str, account_id: &str) -> WorkerResult<()>;
}

/// Receives the finished video for a chapter.
#[async_trait]
pub trait ChapterVideoSink: Send + Sync {
    async fn attach_video(&self, chapter_id: &str, key: &str, duration_secs: u32) -> WorkerResult<()>;
}
