//! Redis-backed implementations of the collaborator traits.
//!
//! Entities are stored as JSON documents. Task updates are a
//! read-modify-write guarded by a compare-and-set script, so each
//! `update` call is atomic.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use reel_models::{
    AssemblyTask, AssemblyUpdate, BackgroundTrack, ChapterShots, PublishAccount, PublishTask,
    PublishUpdate, TaskId,
};

use crate::error::{WorkerError, WorkerResult};
use crate::ports::{
    AccountRepository, AssemblyTaskRepository, BackgroundTrackCatalog, ChapterVideoSink,
    PublishTaskRepository, ShotLocator,
};

const MAX_CAS_ATTEMPTS: usize = 8;

static COMPARE_AND_SET: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            redis.call('SET', KEYS[1], ARGV[2])
            return 1
        end
        return 0
        ",
    )
});

/// Redis document store.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> WorkerResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            prefix: prefix.into(),
        })
    }

    /// Create from `REDIS_URL` and `STORE_KEY_PREFIX`.
    pub fn from_env() -> WorkerResult<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let prefix = std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "reel".to_string());
        Self::new(&url, prefix)
    }

    async fn conn(&self) -> WorkerResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WorkerError::repository(format!("Redis connection failed: {e}")))
    }

    fn assembly_key(&self, id: &TaskId) -> String {
        format!("{}:assembly:{}", self.prefix, id)
    }

    fn publish_key(&self, id: &TaskId) -> String {
        format!("{}:publish:{}", self.prefix, id)
    }

    fn shots_key(&self, chapter_id: &str) -> String {
        format!("{}:chapter:{}:shots", self.prefix, chapter_id)
    }

    fn video_key(&self, chapter_id: &str) -> String {
        format!("{}:chapter:{}:video", self.prefix, chapter_id)
    }

    fn track_key(&self, id: &str) -> String {
        format!("{}:track:{}", self.prefix, id)
    }

    fn account_key(&self, id: &str) -> String {
        format!("{}:account:{}", self.prefix, id)
    }

    fn user_accounts_key(&self, user_id: &str) -> String {
        format!("{}:user:{}:accounts", self.prefix, user_id)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> WorkerResult<Option<T>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|r| serde_json::from_str(&r))
            .transpose()
            .map_err(WorkerError::from)
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> WorkerResult<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, serde_json::to_string(value)?).await?;
        Ok(())
    }

    /// Read, apply, compare-and-set; repeats when another writer got in between.
    async fn update_json<T, F>(&self, key: &str, id: &TaskId, apply: F) -> WorkerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T) -> WorkerResult<()>,
    {
        let mut conn = self.conn().await?;
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw: Option<String> = conn.get(key).await?;
            let raw = raw.ok_or_else(|| WorkerError::not_found(id.as_str()))?;
            let mut value: T = serde_json::from_str(&raw)?;
            apply(&mut value)?;
            let next = serde_json::to_string(&value)?;

            let swapped: i32 = COMPARE_AND_SET
                .key(key)
                .arg(&raw)
                .arg(&next)
                .invoke_async(&mut conn)
                .await?;
            if swapped == 1 {
                return Ok(value);
            }
            debug!("Concurrent write to {}, retrying (attempt {})", key, attempt);
        }
        Err(WorkerError::repository(format!(
            "gave up updating {key} after {MAX_CAS_ATTEMPTS} concurrent writes"
        )))
    }

    pub async fn put_assembly(&self, task: &AssemblyTask) -> WorkerResult<()> {
        self.put_json(&self.assembly_key(&task.id), task).await
    }

    pub async fn put_publish(&self, task: &PublishTask) -> WorkerResult<()> {
        self.put_json(&self.publish_key(&task.id), task).await
    }

    pub async fn put_chapter(&self, shots: &ChapterShots) -> WorkerResult<()> {
        self.put_json(&self.shots_key(&shots.chapter_id), shots).await
    }

    pub async fn put_track(&self, track: &BackgroundTrack) -> WorkerResult<()> {
        self.put_json(&self.track_key(&track.id), track).await
    }

    pub async fn put_account(&self, account: &PublishAccount) -> WorkerResult<()> {
        self.put_json(&self.account_key(&account.id), account).await?;
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(self.user_accounts_key(&account.user_id), &account.id)
            .await?;
        Ok(())
    }

    pub async fn check_connectivity(&self) -> WorkerResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl AssemblyTaskRepository for RedisStore {
    async fn get(&self, id: &TaskId) -> WorkerResult<AssemblyTask> {
        self.get_json(&self.assembly_key(id))
            .await?
            .ok_or_else(|| WorkerError::not_found(id.as_str()))
    }

    async fn update(&self, id: &TaskId, update: &AssemblyUpdate) -> WorkerResult<AssemblyTask> {
        self.update_json(&self.assembly_key(id), id, |task: &mut AssemblyTask| {
            task.apply(update).map_err(WorkerError::from)
        })
        .await
    }
}

#[async_trait]
impl PublishTaskRepository for RedisStore {
    async fn get(&self, id: &TaskId) -> WorkerResult<PublishTask> {
        self.get_json(&self.publish_key(id))
            .await?
            .ok_or_else(|| WorkerError::not_found(id.as_str()))
    }

    async fn update(&self, id: &TaskId, update: &PublishUpdate) -> WorkerResult<PublishTask> {
        self.update_json(&self.publish_key(id), id, |task: &mut PublishTask| {
            task.apply(update).map_err(WorkerError::from)
        })
        .await
    }
}

#[async_trait]
impl ShotLocator for RedisStore {
    async fn chapter_shots(&self, chapter_id: &str) -> WorkerResult<ChapterShots> {
        let mut shots: ChapterShots = self
            .get_json(&self.shots_key(chapter_id))
            .await?
            .ok_or_else(|| WorkerError::validation(format!("chapter {chapter_id} not found")))?;
        shots.sort();
        Ok(shots)
    }
}

#[async_trait]
impl BackgroundTrackCatalog for RedisStore {
    async fn get_by_id(&self, id: &str) -> WorkerResult<Option<BackgroundTrack>> {
        self.get_json(&self.track_key(id)).await
    }
}

#[async_trait]
impl AccountRepository for RedisStore {
    async fn get(&self, id: &str) -> WorkerResult<Option<PublishAccount>> {
        self.get_json(&self.account_key(id)).await
    }

    async fn list_for_user(&self, user_id: &str) -> WorkerResult<Vec<PublishAccount>> {
        let mut conn = self.conn().await?;
        let mut ids: Vec<String> = conn.smembers(self.user_accounts_key(user_id)).await?;
        ids.sort();

        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.get_json::<PublishAccount>(&self.account_key(&id)).await? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn set_default(&self, user_id: &str, account_id: &str) -> WorkerResult<()> {
        let accounts = self.list_for_user(user_id).await?;
        if !accounts.iter().any(|a| a.id == account_id) {
            return Err(WorkerError::credentials(format!(
                "account {account_id} does not belong to user {user_id}"
            )));
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for mut account in accounts {
            account.is_default = account.id == account_id;
            pipe.set(self.account_key(&account.id), serde_json::to_string(&account)?)
                .ignore();
        }
        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl ChapterVideoSink for RedisStore {
    async fn attach_video(&self, chapter_id: &str, key: &str, duration_secs: u32) -> WorkerResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            self.video_key(chapter_id),
            &[("key", key.to_string()), ("duration_secs", duration_secs.to_string())],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::AssemblyStatus;

    fn store() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        RedisStore::new(&url, format!("reel-test-{}", uuid::Uuid::new_v4())).unwrap()
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_assembly_update_roundtrip() {
        let store = store();
        let task = AssemblyTask::new("u1", "ch1");
        store.put_assembly(&task).await.unwrap();

        let updated = AssemblyTaskRepository::update(&store, &task.id, &AssemblyUpdate::stage(AssemblyStatus::Validating))
            .await
            .unwrap();
        assert_eq!(updated.status, AssemblyStatus::Validating);

        let fetched = AssemblyTaskRepository::get(&store, &task.id).await.unwrap();
        assert_eq!(fetched.progress, 5);

        let err = AssemblyTaskRepository::update(&store, &task.id, &AssemblyUpdate::stage(AssemblyStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Model(_)));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_set_default_account() {
        let store = store();
        let mut a = PublishAccount::new("a", "u1", "main", "/c/a.json");
        a.is_default = true;
        store.put_account(&a).await.unwrap();
        store
            .put_account(&PublishAccount::new("b", "u1", "alt", "/c/b.json"))
            .await
            .unwrap();

        store.set_default("u1", "b").await.unwrap();
        let accounts = store.list_for_user("u1").await.unwrap();
        assert!(!accounts[0].is_default);
        assert!(accounts[1].is_default);
    }
}
