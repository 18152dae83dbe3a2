//! Status and progress reporting for a single run.
//!
//! The pipeline is the only writer for its task. Trackers remember the last
//! progress written so a run never reports a lower value.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use reel_models::{
    AssemblyStatus, AssemblyTask, AssemblyUpdate, PublishTask, PublishUpdate, TaskId,
};

use crate::error::WorkerResult;
use crate::ports::{AssemblyTaskRepository, PublishTaskRepository};

/// Writes assembly stage transitions and progress.
pub struct TaskTracker {
    repo: Arc<dyn AssemblyTaskRepository>,
    task_id: TaskId,
    progress: AtomicU8,
}

impl TaskTracker {
    pub fn new(repo: Arc<dyn AssemblyTaskRepository>, task: &AssemblyTask) -> Self {
        Self {
            repo,
            task_id: task.id.clone(),
            progress: AtomicU8::new(task.progress),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Last progress written.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    fn clamp(&self, progress: u8) -> u8 {
        let clamped = progress.min(100).max(self.progress());
        self.progress.store(clamped, Ordering::SeqCst);
        clamped
    }

    /// Enter a stage at its checkpoint progress.
    pub async fn enter(&self, status: AssemblyStatus) -> WorkerResult<AssemblyTask> {
        let mut update = AssemblyUpdate::new().status(status);
        if let Some(checkpoint) = status.checkpoint() {
            update = update.progress(self.clamp(checkpoint));
        }
        self.repo.update(&self.task_id, &update).await
    }

    /// Report progress within the current stage.
    pub async fn report(&self, progress: u8) -> WorkerResult<AssemblyTask> {
        let update = AssemblyUpdate::new().progress(self.clamp(progress));
        self.repo.update(&self.task_id, &update).await
    }

    pub async fn complete(&self, result_key: &str, duration_secs: u32) -> WorkerResult<AssemblyTask> {
        self.clamp(100);
        self.repo
            .update(
                &self.task_id,
                &AssemblyUpdate::completed(result_key, Some(duration_secs)),
            )
            .await
    }

    /// Mark failed, keeping the last progress.
    pub async fn fail(&self, message: &str) -> WorkerResult<AssemblyTask> {
        self.repo
            .update(&self.task_id, &AssemblyUpdate::failed(message))
            .await
    }
}

/// Writes publish status transitions and progress.
pub struct PublishTracker {
    repo: Arc<dyn PublishTaskRepository>,
    task_id: TaskId,
    progress: AtomicU8,
}

impl PublishTracker {
    pub fn new(repo: Arc<dyn PublishTaskRepository>, task: &PublishTask) -> Self {
        Self {
            repo,
            task_id: task.id.clone(),
            progress: AtomicU8::new(task.progress),
        }
    }

    fn clamp(&self, progress: u8) -> u8 {
        let clamped = progress.min(100).max(self.progress.load(Ordering::SeqCst));
        self.progress.store(clamped, Ordering::SeqCst);
        clamped
    }

    pub async fn start(&self) -> WorkerResult<PublishTask> {
        let update = PublishUpdate::uploading();
        if let Some(p) = update.progress {
            self.clamp(p);
        }
        self.repo.update(&self.task_id, &update).await
    }

    pub async fn report(&self, progress: u8) -> WorkerResult<PublishTask> {
        let update = PublishUpdate {
            progress: Some(self.clamp(progress)),
            ..PublishUpdate::default()
        };
        self.repo.update(&self.task_id, &update).await
    }

    pub async fn published(
        &self,
        video_id: Option<String>,
        numeric_id: Option<String>,
    ) -> WorkerResult<PublishTask> {
        self.clamp(100);
        self.repo
            .update(&self.task_id, &PublishUpdate::published(video_id, numeric_id))
            .await
    }

    pub async fn fail(&self, message: &str) -> WorkerResult<PublishTask> {
        self.repo
            .update(&self.task_id, &PublishUpdate::failed(message))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let store = MemoryStore::new();
        let task = AssemblyTask::new("u1", "ch1");
        store.insert_assembly(task.clone()).await;
        let tracker = TaskTracker::new(Arc::new(store.clone()), &task);

        tracker.enter(AssemblyStatus::Validating).await.unwrap();
        tracker.enter(AssemblyStatus::DownloadingMaterials).await.unwrap();
        let stored = tracker.report(10).await.unwrap();
        assert_eq!(stored.progress, 20);
        assert_eq!(tracker.progress(), 20);

        let stored = tracker.fail("boom").await.unwrap();
        assert_eq!(stored.status, AssemblyStatus::Failed);
        assert_eq!(stored.progress, 20);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }
}
