//! Publish pipeline: sends a finished assembly to the platform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn, Instrument};

use reel_models::{
    AssemblyStatus, ModelError, PublishAccount, PublishStatus, PublishTask, PublishTaskView,
    PublishUpdate, TaskId,
};
use reel_publish::{cookie_file_is_valid, LoginInstructions, UploadRequest, Uploader, UploaderConfig};
use reel_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::ports::{AccountRepository, AssemblyTaskRepository, PublishTaskRepository};
use crate::scratch::ScratchDir;
use crate::tracker::PublishTracker;

const DEFAULT_COVER_EXTENSION: &str = "jpg";

/// Summary of a published video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishStats {
    pub task_id: TaskId,
    pub platform_video_id: Option<String>,
    pub platform_numeric_id: Option<String>,
    pub platform_url: Option<String>,
}

pub struct PublishPipeline {
    config: WorkerConfig,
    tasks: Arc<dyn PublishTaskRepository>,
    assemblies: Arc<dyn AssemblyTaskRepository>,
    accounts: Arc<dyn AccountRepository>,
    store: Arc<dyn BlobStore>,
    uploader: Arc<dyn Uploader>,
    uploader_config: UploaderConfig,
}

impl PublishPipeline {
    pub fn new(
        config: WorkerConfig,
        tasks: Arc<dyn PublishTaskRepository>,
        assemblies: Arc<dyn AssemblyTaskRepository>,
        accounts: Arc<dyn AccountRepository>,
        store: Arc<dyn BlobStore>,
        uploader: Arc<dyn Uploader>,
        uploader_config: UploaderConfig,
    ) -> Self {
        Self {
            config,
            tasks,
            assemblies,
            accounts,
            store,
            uploader,
            uploader_config,
        }
    }

    /// Upload the assembled video of a pending publish task.
    ///
    /// An uploader rejection stores the uploader's stderr verbatim on the task.
    pub async fn run_publish(&self, task_id: &TaskId) -> WorkerResult<PublishStats> {
        let task = self.tasks.get(task_id).await?;
        if task.status != PublishStatus::Pending {
            return Err(WorkerError::invalid_state(format!(
                "publish task {} is {}, only pending tasks can run",
                task_id, task.status
            )));
        }

        let logger = JobLogger::new(task_id, "publish");
        let tracker = PublishTracker::new(Arc::clone(&self.tasks), &task);
        logger.log_start(&format!(
            "Publishing assembly {} as \"{}\"",
            task.assembly_task_id, task.metadata.title
        ));

        let span = logger.create_span();
        let result = self.execute(&task, &tracker, &logger).instrument(span).await;

        match result {
            Ok(stats) => {
                metrics::record_publish_run("published");
                logger.log_completion(&format!(
                    "Published as {}",
                    stats.platform_video_id.as_deref().unwrap_or("<no id>")
                ));
                Ok(stats)
            }
            Err(e) => {
                metrics::record_publish_run(e.kind());
                logger.log_error(&e.to_string());
                if let Err(mark_err) = tracker.fail(&e.task_message()).await {
                    warn!(
                        task_id = %task_id,
                        "Failed to mark publish task failed: {}", mark_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Reset a failed publish task and upload again with a fresh uploader process.
    pub async fn retry_publish(&self, task_id: &TaskId) -> WorkerResult<PublishStats> {
        let task = self.tasks.get(task_id).await?;
        if task.status != PublishStatus::Failed {
            return Err(WorkerError::invalid_state(format!(
                "publish task {} is {}, only failed tasks can be retried",
                task_id, task.status
            )));
        }

        info!(task_id = %task_id, "Retrying publish task");
        self.tasks.update(task_id, &PublishUpdate::reset()).await?;
        self.run_publish(task_id).await
    }

    /// Run a task again after its queue message was redelivered.
    ///
    /// `None` means the task had already been published.
    pub async fn rerun_publish(&self, task_id: &TaskId) -> WorkerResult<Option<PublishStats>> {
        let task = self.tasks.get(task_id).await?;
        match task.status {
            PublishStatus::Published => {
                info!(task_id = %task_id, "Already published, nothing to rerun");
                Ok(None)
            }
            PublishStatus::Pending => self.run_publish(task_id).await.map(Some),
            PublishStatus::Failed => self.retry_publish(task_id).await.map(Some),
            PublishStatus::Uploading => {
                warn!(task_id = %task_id, "Publish interrupted while uploading");
                self.tasks
                    .update(task_id, &PublishUpdate::failed("interrupted while uploading"))
                    .await?;
                self.retry_publish(task_id).await.map(Some)
            }
        }
    }

    /// Login command and target cookie path for an account.
    pub fn login_instructions(&self, account_id: &str) -> LoginInstructions {
        LoginInstructions::for_account(&self.uploader_config, account_id)
    }

    async fn execute(
        &self,
        task: &PublishTask,
        tracker: &PublishTracker,
        logger: &JobLogger,
    ) -> WorkerResult<PublishStats> {
        tracker.start().await?;

        let assembly = self.assemblies.get(&task.assembly_task_id).await?;
        let video_key = match (&assembly.status, &assembly.result_key) {
            (AssemblyStatus::Completed, Some(key)) => key.clone(),
            (AssemblyStatus::Completed, None) => {
                return Err(
                    ModelError::assembly_not_ready(assembly.id.as_str(), "no result video").into(),
                )
            }
            (status, _) => {
                return Err(ModelError::assembly_not_ready(
                    assembly.id.as_str(),
                    format!("status is {status}"),
                )
                .into())
            }
        };

        let cookie = self.resolve_credentials(task).await?;
        logger.log_stage("credentials", &format!("Using cookie {}", cookie.display()));

        // Scratch files go away with this guard on every exit path
        let scratch = ScratchDir::new(&self.config.work_dir, "publish_")?;

        let video = scratch.file("video", "mp4");
        logger.log_stage("downloading", &format!("Fetching {video_key}"));
        self.store.download_to_path(&video_key, video.path()).await?;

        let cover = match &task.metadata.cover_key {
            Some(cover_key) => {
                let file = scratch.file("cover", &cover_extension(cover_key));
                self.store.download_to_path(cover_key, file.path()).await?;
                Some(file)
            }
            None => None,
        };
        tracker.report(30).await?;

        let mut request =
            UploadRequest::new(video.path(), task.metadata.clone()).with_cookie(&cookie);
        if let Some(cover) = &cover {
            request = request.with_cover(cover.path());
        }

        logger.log_stage("uploading", "Running uploader");
        let receipt = self.uploader.upload(&request).await?;
        if receipt.ids.is_empty() {
            logger.log_warning("Uploader succeeded but printed no platform ids");
        }

        let stored = tracker
            .published(receipt.ids.video_id, receipt.ids.numeric_id)
            .await?;
        let view = PublishTaskView::from(stored);

        Ok(PublishStats {
            task_id: view.task.id.clone(),
            platform_video_id: view.task.platform_video_id.clone(),
            platform_numeric_id: view.task.platform_numeric_id.clone(),
            platform_url: view.platform_url,
        })
    }

    /// Cookie file for the task.
    ///
    /// An explicit account must have a cookie file carrying a token. Without
    /// one, the user's default active account is used, else the most
    /// recently logged-in active account; its cookie file only has to exist.
    pub async fn resolve_credentials(&self, task: &PublishTask) -> WorkerResult<PathBuf> {
        if let Some(account_id) = &task.account_id {
            if let Some(account) = self.accounts.get(account_id).await? {
                if account.user_id != task.user_id {
                    return Err(WorkerError::credentials(format!(
                        "account {account_id} does not belong to user {}",
                        task.user_id
                    )));
                }
            }
            let path = self.uploader_config.cookie_path_for(account_id);
            if !cookie_file_is_valid(&path).await {
                return Err(WorkerError::credentials(format!(
                    "account {account_id} is not logged in (no valid cookie at {})",
                    path.display()
                )));
            }
            return Ok(path);
        }

        let accounts = self.accounts.list_for_user(&task.user_id).await?;
        if let Some(account) = fallback_account(&accounts) {
            let path = PathBuf::from(&account.cookie_path);
            if !account.cookie_path.is_empty() && file_exists(&path).await {
                return Ok(path);
            }
            warn!(
                account_id = %account.id,
                "Cookie file {} for fallback account is missing", account.cookie_path
            );
        }

        Err(WorkerError::credentials(format!(
            "no logged-in publish account for user {}; add an account first",
            task.user_id
        )))
    }
}

/// Default active account, else the active account that logged in most recently.
fn fallback_account(accounts: &[PublishAccount]) -> Option<&PublishAccount> {
    let usable = || accounts.iter().filter(|a| a.is_usable());
    usable()
        .find(|a| a.is_default)
        .or_else(|| usable().max_by_key(|a| a.last_login_at))
}

fn cover_extension(key: &str) -> String {
    Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_string())
        .unwrap_or_else(|| DEFAULT_COVER_EXTENSION.to_string())
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use reel_models::{AssemblyTask, PublishMetadata};
    use reel_publish::{OutputParser, PlatformIdParser, PublishError, PublishResult, UploadReceipt};
    use reel_storage::MemoryBlobStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct SeenRequest {
        args: Vec<String>,
        video_present: bool,
        cover_present: bool,
        cover_path: Option<PathBuf>,
        video_path: PathBuf,
    }

    /// Uploader double that records what it was asked to do.
    struct FakeUploader {
        outcome: Box<dyn Fn() -> PublishResult<UploadReceipt> + Send + Sync>,
        seen: Mutex<Vec<SeenRequest>>,
    }

    impl FakeUploader {
        fn succeeding(stdout: &'static str) -> Self {
            Self {
                outcome: Box::new(move || {
                    Ok(UploadReceipt {
                        ids: PlatformIdParser.parse(stdout),
                        stdout: stdout.to_string(),
                    })
                }),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn rejecting(stderr: &'static str) -> Self {
            Self {
                outcome: Box::new(move || Err(PublishError::rejected(stderr, Some(1)))),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<SeenRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn upload(&self, request: &UploadRequest) -> PublishResult<UploadReceipt> {
            self.seen.lock().unwrap().push(SeenRequest {
                args: request.to_args(),
                video_present: request.video_path.exists(),
                cover_present: request.cover_path.as_ref().is_some_and(|p| p.exists()),
                cover_path: request.cover_path.clone(),
                video_path: request.video_path.clone(),
            });
            (self.outcome)()
        }
    }

    struct Fixture {
        store: MemoryStore,
        blobs: MemoryBlobStore,
        uploader: Arc<FakeUploader>,
        pipeline: PublishPipeline,
        work: TempDir,
        cookies: TempDir,
    }

    fn fixture(uploader: FakeUploader) -> Fixture {
        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let work = TempDir::new().unwrap();
        let cookies = TempDir::new().unwrap();
        let uploader = Arc::new(uploader);
        let uploader_config = UploaderConfig {
            binary_path: PathBuf::from("/usr/bin/uploader"),
            cookie_dir: cookies.path().to_path_buf(),
            timeout_secs: 5,
        };
        let shared = Arc::new(store.clone());
        let pipeline = PublishPipeline::new(
            WorkerConfig::default().with_work_dir(work.path()),
            shared.clone(),
            shared.clone(),
            shared,
            Arc::new(blobs.clone()),
            uploader.clone(),
            uploader_config,
        );
        Fixture {
            store,
            blobs,
            uploader,
            pipeline,
            work,
            cookies,
        }
    }

    fn completed_assembly() -> AssemblyTask {
        let mut assembly = AssemblyTask::new("user-1", "ch-1");
        assembly.status = AssemblyStatus::Completed;
        assembly.result_key = Some("videos/user-1/abc_chapter_ch-1_movie.mp4".to_string());
        assembly
    }

    async fn seed(fx: &Fixture, metadata: PublishMetadata, account_id: Option<&str>) -> PublishTask {
        let assembly = completed_assembly();
        fx.blobs
            .insert(assembly.result_key.clone().unwrap(), b"video".to_vec())
            .await;
        let task =
            PublishTask::for_assembly(&assembly, metadata, account_id.map(str::to_string)).unwrap();
        fx.store.insert_assembly(assembly).await;
        fx.store.insert_publish(task.clone()).await;
        task
    }

    fn write_cookie(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn scratch_is_empty(fx: &Fixture) -> bool {
        std::fs::read_dir(fx.work.path()).unwrap().next().is_none()
    }

    async fn stored(fx: &Fixture, id: &TaskId) -> PublishTask {
        PublishTaskRepository::get(&fx.store, id).await.unwrap()
    }

    #[tokio::test]
    async fn test_publish_success_stores_ids() {
        let fx = fixture(FakeUploader::succeeding("Upload ok: BV1xY4y1z7Ab aid av170001\n"));
        write_cookie(fx.cookies.path(), "acc-1.json", r#"{"token_info":{"access_token":"t"}}"#);
        fx.blobs.insert("covers/user-1/c.png", b"png".to_vec()).await;
        let metadata = PublishMetadata::new("Chapter one")
            .with_tags(["drama", "ai"])
            .with_cover("covers/user-1/c.png");
        let task = seed(&fx, metadata, Some("acc-1")).await;

        let stats = fx.pipeline.run_publish(&task.id).await.unwrap();

        assert_eq!(stats.platform_video_id.as_deref(), Some("BV1xY4y1z7Ab"));
        assert_eq!(stats.platform_numeric_id.as_deref(), Some("170001"));
        assert_eq!(
            stats.platform_url.as_deref(),
            Some("https://www.bilibili.com/video/BV1xY4y1z7Ab")
        );

        let task = stored(&fx, &task.id).await;
        assert_eq!(task.status, PublishStatus::Published);
        assert_eq!(task.progress, 100);
        assert!(task.published_at.is_some());

        let seen = fx.uploader.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].video_present);
        assert!(seen[0].cover_present);
        assert_eq!(
            seen[0].cover_path.as_ref().unwrap().extension().unwrap(),
            "png"
        );
        assert_eq!(seen[0].args[0], "-u");
        assert!(seen[0].args[1].ends_with("acc-1.json"));
        assert_eq!(seen[0].args[2], "upload");

        assert!(!seen[0].video_path.exists());
        assert!(scratch_is_empty(&fx));
    }

    #[tokio::test]
    async fn test_rejection_keeps_raw_stderr() {
        let stderr = "Error: code 21566, uploads too frequent\nCaused by: rate limited\n";
        let fx = fixture(FakeUploader::rejecting(stderr));
        write_cookie(fx.cookies.path(), "acc-1.json", r#"{"cookies":[{"name":"SESSDATA"}]}"#);
        let task = seed(&fx, PublishMetadata::new("t"), Some("acc-1")).await;

        let err = fx.pipeline.run_publish(&task.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Publish(PublishError::UploadRejected { .. })));

        let task = stored(&fx, &task.id).await;
        assert_eq!(task.status, PublishStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some(stderr));
        assert_eq!(task.progress, 30);
        assert!(scratch_is_empty(&fx));
    }

    #[tokio::test]
    async fn test_explicit_account_needs_token() {
        let fx = fixture(FakeUploader::succeeding("BV1aa"));
        write_cookie(fx.cookies.path(), "acc-1.json", r#"{"token_info":{}}"#);
        let task = seed(&fx, PublishMetadata::new("t"), Some("acc-1")).await;

        let err = fx.pipeline.run_publish(&task.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Credentials(_)));
        assert!(fx.uploader.seen().is_empty());

        let task = stored(&fx, &task.id).await;
        assert_eq!(task.status, PublishStatus::Failed);
        assert_eq!(task.progress, 10);
    }

    #[tokio::test]
    async fn test_explicit_account_of_other_user_rejected() {
        let fx = fixture(FakeUploader::succeeding("BV1aa"));
        write_cookie(fx.cookies.path(), "acc-9.json", r#"{"access_token":"t"}"#);
        fx.store
            .insert_account(PublishAccount::new("acc-9", "user-2", "other", ""))
            .await;
        let task = seed(&fx, PublishMetadata::new("t"), Some("acc-9")).await;

        let err = fx.pipeline.run_publish(&task.id).await.unwrap_err();
        assert!(matches!(&err, WorkerError::Credentials(m) if m.contains("does not belong")));
    }

    #[tokio::test]
    async fn test_fallback_prefers_default_then_latest_login() {
        let fx = fixture(FakeUploader::succeeding("BV1aa"));
        let dir = fx.cookies.path();
        let old = write_cookie(dir, "old.json", "{}");
        let recent = write_cookie(dir, "recent.json", "{}");
        let default = write_cookie(dir, "default.json", "{}");

        let mut a = PublishAccount::new("a", "user-1", "old", old.to_string_lossy());
        a.mark_logged_in(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let mut b = PublishAccount::new("b", "user-1", "recent", recent.to_string_lossy());
        b.mark_logged_in(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap());
        let mut inactive = PublishAccount::new("c", "user-1", "gone", default.to_string_lossy());
        inactive.is_active = false;
        inactive.is_default = true;
        for account in [a, b, inactive] {
            fx.store.insert_account(account).await;
        }
        let task = seed(&fx, PublishMetadata::new("t"), None).await;

        assert_eq!(fx.pipeline.resolve_credentials(&task).await.unwrap(), recent);

        let mut d = PublishAccount::new("d", "user-1", "default", default.to_string_lossy());
        d.is_default = true;
        fx.store.insert_account(d).await;
        assert_eq!(fx.pipeline.resolve_credentials(&task).await.unwrap(), default);
    }

    #[tokio::test]
    async fn test_no_accounts_is_fatal() {
        let fx = fixture(FakeUploader::succeeding("BV1aa"));
        fx.store
            .insert_account(PublishAccount::new("a", "user-1", "x", "/nonexistent/cookie.json"))
            .await;
        let task = seed(&fx, PublishMetadata::new("t"), None).await;

        let err = fx.pipeline.run_publish(&task.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Credentials(_)));
        assert!(fx.uploader.seen().is_empty());
    }

    #[tokio::test]
    async fn test_assembly_must_be_completed() {
        let fx = fixture(FakeUploader::succeeding("BV1aa"));
        let task = seed(&fx, PublishMetadata::new("t"), None).await;
        let mut assembly = completed_assembly();
        assembly.id = task.assembly_task_id.clone();
        assembly.result_key = None;
        fx.store.insert_assembly(assembly).await;

        let err = fx.pipeline.run_publish(&task.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Model(ModelError::AssemblyNotReady { .. })));
    }

    #[tokio::test]
    async fn test_only_pending_runs_and_retry_resets() {
        let fx = fixture(FakeUploader::rejecting("boom"));
        write_cookie(fx.cookies.path(), "acc-1.json", r#"{"access_token":"t"}"#);
        let task = seed(&fx, PublishMetadata::new("t"), Some("acc-1")).await;

        assert!(fx.pipeline.retry_publish(&task.id).await.is_err());
        assert_eq!(stored(&fx, &task.id).await.status, PublishStatus::Pending);

        fx.pipeline.run_publish(&task.id).await.unwrap_err();
        let err = fx.pipeline.run_publish(&task.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidState(_)));

        fx.pipeline.retry_publish(&task.id).await.unwrap_err();
        assert_eq!(fx.uploader.seen().len(), 2);
        let task = stored(&fx, &task.id).await;
        assert_eq!(task.status, PublishStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_cover_extension() {
        assert_eq!(cover_extension("covers/u/a.webp"), "webp");
        assert_eq!(cover_extension("covers/u/noext"), "jpg");
    }

    #[test]
    fn test_fallback_account_ignores_inactive() {
        let mut inactive = PublishAccount::new("a", "u", "a", "a.json");
        inactive.is_active = false;
        inactive.is_default = true;
        assert!(fallback_account(&[inactive.clone()]).is_none());

        let active = PublishAccount::new("b", "u", "b", "b.json");
        let accounts = [inactive, active];
        let picked = fallback_account(&accounts).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_login_instructions_use_cookie_dir() {
        let fx = fixture(FakeUploader::succeeding(""));
        let info = fx.pipeline.login_instructions("acc-3");
        assert_eq!(info.cookie_file, fx.cookies.path().join("acc-3.json"));
    }
}
