//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reel_queue::{JobQueue, QueueJob};

use crate::assembly::AssemblyPipeline;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::publish::PublishPipeline;
use crate::retry::FailureTracker;

/// Max jobs read from the stream per poll.
const MAX_BATCH: usize = 5;
/// XREADGROUP block time.
const BLOCK_MS: u64 = 1000;

/// Routes queue jobs to the pipelines.
pub struct JobHandlers {
    pub assembly: AssemblyPipeline,
    pub publish: PublishPipeline,
}

impl JobHandlers {
    pub fn new(assembly: AssemblyPipeline, publish: PublishPipeline) -> Self {
        Self { assembly, publish }
    }

    /// Run one job. Retry jobs reset their failed task first.
    ///
    /// A `redelivered` message already ran at least once, so the task may have
    /// been marked failed or left mid-stage by that attempt.
    pub async fn handle(&self, job: &QueueJob, redelivered: bool) -> WorkerResult<()> {
        match job {
            QueueJob::AssembleChapter(j) if redelivered => {
                self.assembly.rerun_assembly(&j.task_id).await.map(|_| ())
            }
            QueueJob::AssembleChapter(j) if j.retry => {
                self.assembly.retry_assembly(&j.task_id).await.map(|_| ())
            }
            QueueJob::AssembleChapter(j) => self.assembly.run_assembly(&j.task_id).await.map(|_| ()),
            QueueJob::PublishVideo(j) if redelivered => {
                self.publish.rerun_publish(&j.task_id).await.map(|_| ())
            }
            QueueJob::PublishVideo(j) if j.retry => {
                self.publish.retry_publish(&j.task_id).await.map(|_| ())
            }
            QueueJob::PublishVideo(j) => self.publish.run_publish(&j.task_id).await.map(|_| ()),
        }
    }
}

/// What happens to a stream message after its job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// The task already records the failure; ack and release the dedup key
    Complete,
    /// Leave pending so a later claim redelivers it
    Redeliver,
    DeadLetter,
}

/// Disposition of a failed job. `attempts` is read lazily, only for retryable errors.
pub async fn failure_action<F, Fut>(error: &WorkerError, max_retries: u32, attempts: F) -> FailureAction
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = u32>,
{
    if !error.is_retryable() {
        return FailureAction::Complete;
    }
    if attempts().await >= max_retries {
        FailureAction::DeadLetter
    } else {
        FailureAction::Redeliver
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    handlers: Arc<JobHandlers>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, handlers: JobHandlers) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            handlers: Arc::new(handlers),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume jobs until shutdown is signalled, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = self.spawn_claim_loop();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(5);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}, exiting anyway",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically claim jobs left pending by crashed workers.
    fn spawn_claim_loop(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let handlers = Arc::clone(&self.handlers);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match queue.claim_pending(&consumer_name, min_idle_ms, MAX_BATCH).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    Self::spawn_job(
                                        permit,
                                        Arc::clone(&handlers),
                                        Arc::clone(&queue),
                                        message_id,
                                        job,
                                    );
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, BLOCK_MS, available.min(MAX_BATCH))
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::repository("job semaphore closed"))?;
            Self::spawn_job(
                permit,
                Arc::clone(&self.handlers),
                Arc::clone(&self.queue),
                message_id,
                job,
            );
        }

        Ok(())
    }

    fn spawn_job(
        permit: OwnedSemaphorePermit,
        handlers: Arc<JobHandlers>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        tokio::spawn(async move {
            let _permit = permit;
            Self::execute_job(&handlers, &queue, &message_id, &job).await;
        });
    }

    /// Execute a single job with retry and DLQ handling.
    async fn execute_job(handlers: &JobHandlers, queue: &JobQueue, message_id: &str, job: &QueueJob) {
        let job_id = job.job_id();
        info!(
            job_id = %job_id,
            task_id = %job.task_id(),
            kind = job.kind(),
            "Executing job"
        );

        // The retry counter is only bumped when a failed attempt is left for redelivery
        let redelivered = match queue.get_retry_count(message_id).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!("Failed to read retry count for job {}: {}", job_id, e);
                false
            }
        };

        let error = match handlers.handle(job, redelivered).await {
            Ok(()) => {
                info!("Job {} completed successfully", job_id);
                metrics::record_job_completed(job.kind());
                if let Err(e) = queue.complete(message_id, job).await {
                    error!("Failed to complete job {}: {}", job_id, e);
                }
                return;
            }
            Err(e) => e,
        };

        error!("Job {} failed: {}", job_id, error);
        metrics::record_job_failed(job.kind());

        let max_retries = queue.max_retries();
        let action = failure_action(&error, max_retries, || async {
            queue.increment_retry(message_id).await.unwrap_or(u32::MAX)
        })
        .await;

        match action {
            FailureAction::Complete => {
                if let Err(e) = queue.complete(message_id, job).await {
                    error!("Failed to complete job {}: {}", job_id, e);
                }
            }
            FailureAction::Redeliver => {
                info!(
                    "Job {} will be redelivered after the visibility timeout",
                    job_id
                );
            }
            FailureAction::DeadLetter => {
                warn!(
                    "Job {} exceeded max retries ({}), moving to DLQ",
                    job_id, max_retries
                );
                if let Err(e) = queue.dlq(message_id, job, &error.to_string()).await {
                    error!("Failed to move job {} to DLQ: {}", job_id, e);
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }
}
