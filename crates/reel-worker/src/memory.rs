//! In-memory implementations of the collaborator traits.
//!
//! Used by tests and by local runs without Redis.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use reel_models::{
    AssemblyTask, AssemblyUpdate, BackgroundTrack, ChapterShots, PublishAccount, PublishTask,
    PublishUpdate, TaskId,
};

use crate::error::{WorkerError, WorkerResult};
use crate::ports::{
    AccountRepository, AssemblyTaskRepository, BackgroundTrackCatalog, ChapterVideoSink,
    PublishTaskRepository, ShotLocator,
};

/// Video attached to a chapter by a finished assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterVideo {
    pub key: String,
    pub duration_secs: u32,
}

#[derive(Debug, Default)]
struct Inner {
    assemblies: HashMap<TaskId, AssemblyTask>,
    publishes: HashMap<TaskId, PublishTask>,
    chapters: HashMap<String, ChapterShots>,
    tracks: HashMap<String, BackgroundTrack>,
    accounts: HashMap<String, PublishAccount>,
    videos: HashMap<String, ChapterVideo>,
    /// Every stored assembly state, in write order
    assembly_history: HashMap<TaskId, Vec<AssemblyTask>>,
}

/// One shared map per entity; updates hold the write lock for the whole read-modify-write.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_assembly(&self, task: AssemblyTask) {
        self.inner.write().await.assemblies.insert(task.id.clone(), task);
    }

    pub async fn insert_publish(&self, task: PublishTask) {
        self.inner.write().await.publishes.insert(task.id.clone(), task);
    }

    pub async fn insert_chapter(&self, shots: ChapterShots) {
        self.inner
            .write()
            .await
            .chapters
            .insert(shots.chapter_id.clone(), shots);
    }

    pub async fn insert_track(&self, track: BackgroundTrack) {
        self.inner.write().await.tracks.insert(track.id.clone(), track);
    }

    pub async fn insert_account(&self, account: PublishAccount) {
        self.inner
            .write()
            .await
            .accounts
            .insert(account.id.clone(), account);
    }

    pub async fn chapter_video(&self, chapter_id: &str) -> Option<ChapterVideo> {
        self.inner.read().await.videos.get(chapter_id).cloned()
    }

    /// States written for an assembly task, oldest first.
    pub async fn assembly_history(&self, id: &TaskId) -> Vec<AssemblyTask> {
        self.inner
            .read()
            .await
            .assembly_history
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssemblyTaskRepository for MemoryStore {
    async fn get(&self, id: &TaskId) -> WorkerResult<AssemblyTask> {
        self.inner
            .read()
            .await
            .assemblies
            .get(id)
            .cloned()
            .ok_or_else(|| WorkerError::not_found(id.as_str()))
    }

    async fn update(&self, id: &TaskId, update: &AssemblyUpdate) -> WorkerResult<AssemblyTask> {
        let mut inner = self.inner.write().await;
        let task = inner
            .assemblies
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(id.as_str()))?;
        task.apply(update)?;
        let snapshot = task.clone();
        inner
            .assembly_history
            .entry(id.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(snapshot)
    }
}

#[async_trait]
impl PublishTaskRepository for MemoryStore {
    async fn get(&self, id: &TaskId) -> WorkerResult<PublishTask> {
        self.inner
            .read()
            .await
            .publishes
            .get(id)
            .cloned()
            .ok_or_else(|| WorkerError::not_found(id.as_str()))
    }

    async fn update(&self, id: &TaskId, update: &PublishUpdate) -> WorkerResult<PublishTask> {
        let mut inner = self.inner.write().await;
        let task = inner
            .publishes
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(id.as_str()))?;
        task.apply(update)?;
        Ok(task.clone())
    }
}

#[async_trait]
impl ShotLocator for MemoryStore {
    async fn chapter_shots(&self, chapter_id: &str) -> WorkerResult<ChapterShots> {
        let mut shots = self
            .inner
            .read()
            .await
            .chapters
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| WorkerError::validation(format!("chapter {chapter_id} not found")))?;
        shots.sort();
        Ok(shots)
    }
}

#[async_trait]
impl BackgroundTrackCatalog for MemoryStore {
    async fn get_by_id(&self, id: &str) -> WorkerResult<Option<BackgroundTrack>> {
        Ok(self.inner.read().await.tracks.get(id).cloned())
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn get(&self, id: &str) -> WorkerResult<Option<PublishAccount>> {
        Ok(self.inner.read().await.accounts.get(id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> WorkerResult<Vec<PublishAccount>> {
        let mut accounts: Vec<PublishAccount> = self
            .inner
            .read()
            .await
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn set_default(&self, user_id: &str, account_id: &str) -> WorkerResult<()> {
        let mut inner = self.inner.write().await;
        match inner.accounts.get(account_id) {
            Some(account) if account.user_id == user_id => {}
            _ => {
                return Err(WorkerError::credentials(format!(
                    "account {account_id} does not belong to user {user_id}"
                )))
            }
        }
        for account in inner.accounts.values_mut().filter(|a| a.user_id == user_id) {
            account.is_default = account.id == account_id;
        }
        Ok(())
    }
}

#[async_trait]
impl ChapterVideoSink for MemoryStore {
    async fn attach_video(&self, chapter_id: &str, key: &str, duration_secs: u32) -> WorkerResult<()> {
        self.inner.write().await.videos.insert(
            chapter_id.to_string(),
            ChapterVideo {
                key: key.to_string(),
                duration_secs,
            },
        );
        Ok(())
    }
}
