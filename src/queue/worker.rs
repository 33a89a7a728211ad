//! Worker pool
//!
//! Long-lived workers pull jobs off the shared queue, run the injected
//! processor under a per-job deadline and drive the job through its state
//! machine. Failures retry with capped exponential backoff; cancellations
//! are reported and abandoned; panics are contained to the attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{DownloadJob, JobStatus};
use crate::queue::job_queue::{JobQueue, QueueError};

const MAX_BACKOFF_SECS: u64 = 300;

/// How a processing attempt ended, when not successfully
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The attempt was cancelled; reported as failed, never retried
    #[error("cancelled")]
    Cancelled,
    /// The failure cannot be fixed by retrying (bad URL, rejected upload)
    #[error("{0}")]
    Permanent(String),
    /// A retryable failure
    #[error("{0}")]
    Failed(String),
}

/// Write-through progress handle the worker hands to the processor. Every
/// report becomes a status update on the shared store, which also publishes
/// it to the owning user's channel.
#[derive(Clone)]
pub struct ProgressSink {
    queue: Arc<dyn JobQueue>,
    job_id: String,
}

impl ProgressSink {
    pub async fn report(&self, status: JobStatus, progress: f64) {
        if let Err(e) = self
            .queue
            .update_status(&self.job_id, status, progress, None)
            .await
        {
            warn!(job_id = %self.job_id, "progress update failed: {}", e);
        }
    }
}

/// The unit of work the pool runs per job
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(
        &self,
        job: DownloadJob,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), ProcessError>;
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub max_retries: u32,
    pub job_timeout: Duration,
    pub dequeue_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            max_retries: 3,
            job_timeout: Duration::from_secs(600),
            dequeue_timeout: Duration::from_secs(5),
        }
    }
}

/// Exponential backoff before retry attempt `retry_count + 1`, capped at
/// five minutes: 1s, 2s, 4s, ...
pub fn backoff_delay(retry_count: u32) -> Duration {
    let secs = 1u64
        .checked_shl(retry_count)
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    processor: Arc<dyn JobProcessor>,
    config: WorkerPoolConfig,
    cancel: CancellationToken,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        processor: Arc<dyn JobProcessor>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            processor,
            config,
            cancel: CancellationToken::new(),
            handles: parking_lot::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the workers. Safe to call more than once; only the first call
    /// does anything.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock();
        for id in 0..self.config.worker_count.max(1) {
            let worker = Worker {
                id,
                queue: Arc::clone(&self.queue),
                processor: Arc::clone(&self.processor),
                config: self.config,
                cancel: self.cancel.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        info!(workers = self.config.worker_count.max(1), "worker pool started");
    }

    /// Cancel dequeue waits and wait for in-flight jobs, up to `timeout`.
    /// On expiry an error is returned, but no new dequeues happen either
    /// way: the stop signal fires before this method ever returns.
    pub async fn stop(&self, timeout: Duration) -> anyhow::Result<()> {
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            anyhow::bail!("timed out waiting for in-flight jobs");
        }

        info!("worker pool stopped");
        Ok(())
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    processor: Arc<dyn JobProcessor>,
    config: WorkerPoolConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.queue.dequeue(self.config.dequeue_timeout) => match result {
                    Ok(job) => job,
                    Err(QueueError::Empty) => continue,
                    Err(e) => {
                        warn!(worker = self.id, "dequeue failed: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            self.process_job(job).await;
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn process_job(&self, job: DownloadJob) {
        let job_id = job.id.clone();
        info!(worker = self.id, job_id = %job_id, url = %job.url, "processing job");

        if let Err(e) = self
            .queue
            .update_status(&job_id, JobStatus::Downloading, 0.0, None)
            .await
        {
            warn!(job_id = %job_id, "failed to mark job downloading: {}", e);
            return;
        }

        match self.run_processor(job).await {
            Ok(()) => {
                if let Err(e) = self
                    .queue
                    .update_status(&job_id, JobStatus::Complete, 100.0, None)
                    .await
                {
                    warn!(job_id = %job_id, "failed to mark job complete: {}", e);
                } else {
                    info!(job_id = %job_id, "job complete");
                }
            }
            Err(err) => self.handle_failure(&job_id, err).await,
        }
    }

    /// Run the processor inside its own task so a panic only kills the
    /// attempt, under the configured per-job deadline.
    ///
    /// The attempt token is independent of the pool's stop signal: shutdown
    /// stops dequeues but lets a running attempt finish or hit its own
    /// deadline. Only an external cancel (or the deadline) fires this token.
    async fn run_processor(&self, job: DownloadJob) -> Result<(), ProcessError> {
        let attempt_cancel = CancellationToken::new();
        let sink = ProgressSink {
            queue: Arc::clone(&self.queue),
            job_id: job.id.clone(),
        };
        let processor = Arc::clone(&self.processor);
        let token = attempt_cancel.clone();

        let mut handle = tokio::spawn(async move { processor.process(job, sink, token).await });

        tokio::select! {
            result = &mut handle => match result {
                Ok(outcome) => outcome,
                Err(join_err) if join_err.is_panic() => {
                    Err(ProcessError::Failed("processor panicked".to_string()))
                }
                Err(_) => Err(ProcessError::Cancelled),
            },
            _ = tokio::time::sleep(self.config.job_timeout) => {
                attempt_cancel.cancel();
                handle.abort();
                let _ = handle.await;
                Err(ProcessError::Failed(format!(
                    "job timed out after {}s",
                    self.config.job_timeout.as_secs()
                )))
            }
        }
    }

    async fn handle_failure(&self, job_id: &str, err: ProcessError) {
        warn!(job_id = %job_id, "job failed: {}", err);

        if let Err(e) = self
            .queue
            .update_status(job_id, JobStatus::Failed, 0.0, Some(&err.to_string()))
            .await
        {
            warn!(job_id = %job_id, "failed to mark job failed: {}", e);
            return;
        }

        match err {
            // a cancelled attempt is abandoned, never retried
            ProcessError::Cancelled => {
                info!(job_id = %job_id, "attempt cancelled, abandoning");
                return;
            }
            ProcessError::Permanent(_) => {
                info!(job_id = %job_id, "permanent failure, not retrying");
                return;
            }
            ProcessError::Failed(_) => {}
        }

        // re-read the record for the authoritative retry count
        let fresh = match self.queue.get_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, "failed to re-read job: {}", e);
                return;
            }
        };

        if fresh.retry_count < self.config.max_retries {
            let delay = backoff_delay(fresh.retry_count);
            debug!(
                job_id = %job_id,
                attempt = fresh.retry_count + 1,
                delay_secs = delay.as_secs(),
                "backing off before retry"
            );
            tokio::select! {
                // shutting down: leave the job failed instead of requeueing
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Err(e) = self.queue.increment_retry(job_id).await {
                warn!(job_id = %job_id, "retry requeue failed: {}", e);
            }
        } else {
            warn!(
                job_id = %job_id,
                retries = fresh.retry_count,
                "retry budget exhausted, abandoning"
            );
        }
    }
}
