//! Durable download job queue
//!
//! Jobs live in the shared store as JSON records keyed by id; the pending
//! queue is a list popped from the right, so LPUSH enqueues FIFO and RPUSH
//! requeues a retry at the head. Status updates are read-modify-write and
//! publish the fresh record to the owning user's progress channel.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{DownloadJob, InvalidTransition, JobStatus, SourceType};

/// Pending job ids, LPUSH on enqueue, BRPOP on dequeue
const PENDING_LIST_KEY: &str = "downloads:pending";

fn job_key(id: &str) -> String {
    format!("job:{}", id)
}

fn user_jobs_key(user_id: i64) -> String {
    format!("queue:user:{}:jobs", user_id)
}

/// Progress pub/sub channel for a user. Derivable from the user id alone so
/// subscribers need nothing else.
pub fn progress_channel(user_id: i64) -> String {
    format!("progress:{}", user_id)
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// Dequeue timed out with nothing pending
    #[error("queue empty")]
    Empty,
    #[error("job not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    State(#[from] InvalidTransition),
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("corrupt job record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The queue operations the worker pool and the API surface depend on
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a new job and push it onto the pending list. FIFO among
    /// successfully enqueued jobs.
    async fn enqueue(
        &self,
        user_id: i64,
        url: &str,
        source_type: SourceType,
        mb_recording_id: Option<Uuid>,
    ) -> Result<DownloadJob, QueueError>;

    /// Blocking pop of the next pending job, up to `timeout`. Returns
    /// [`QueueError::Empty`] when nothing arrived in time.
    async fn dequeue(&self, timeout: Duration) -> Result<DownloadJob, QueueError>;

    async fn get_job(&self, id: &str) -> Result<DownloadJob, QueueError>;

    /// Read-modify-write a status update and publish the updated record.
    /// A failed publish never fails the transition.
    async fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        progress: f64,
        error: Option<&str>,
    ) -> Result<DownloadJob, QueueError>;

    /// Requeue a failed job for another attempt, at the head of the pending
    /// list so retries run before fresh work.
    async fn increment_retry(&self, id: &str) -> Result<DownloadJob, QueueError>;

    /// Number of pending jobs
    async fn queue_length(&self) -> Result<u64, QueueError>;

    /// All jobs ever enqueued by a user, newest first
    async fn list_user_jobs(&self, user_id: i64) -> Result<Vec<DownloadJob>, QueueError>;
}

/// Redis-backed queue implementation
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::Connection, QueueError> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn save_job(
        conn: &mut redis::aio::Connection,
        job: &DownloadJob,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let _: () = conn.set(job_key(&job.id), payload).await?;
        Ok(())
    }

    async fn load_job(
        conn: &mut redis::aio::Connection,
        id: &str,
    ) -> Result<DownloadJob, QueueError> {
        let payload: Option<String> = conn.get(job_key(id)).await?;
        let payload = payload.ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Fire-and-forget publish of a job record on its user's channel
    async fn publish_progress(conn: &mut redis::aio::Connection, job: &DownloadJob) {
        let channel = progress_channel(job.user_id);
        match serde_json::to_string(job) {
            Ok(payload) => {
                let result: Result<i64, _> = conn.publish(&channel, payload).await;
                if let Err(e) = result {
                    debug!(job_id = %job.id, "progress publish failed: {}", e);
                }
            }
            Err(e) => warn!(job_id = %job.id, "progress serialization failed: {}", e),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(
        &self,
        user_id: i64,
        url: &str,
        source_type: SourceType,
        mb_recording_id: Option<Uuid>,
    ) -> Result<DownloadJob, QueueError> {
        let job = DownloadJob::new(user_id, url.to_string(), source_type, mb_recording_id);
        let mut conn = self.connection().await?;

        Self::save_job(&mut conn, &job).await?;
        let _: i64 = conn.lpush(PENDING_LIST_KEY, &job.id).await?;
        let _: i64 = conn.rpush(user_jobs_key(user_id), &job.id).await?;

        debug!(job_id = %job.id, user_id, url, "job enqueued");
        Ok(job)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<DownloadJob, QueueError> {
        let mut conn = self.connection().await?;

        // BRPOP timeout is in seconds; zero would block forever, so floor at 1
        let secs = timeout.as_secs().max(1);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(PENDING_LIST_KEY)
            .arg(secs)
            .query_async(&mut conn)
            .await?;

        let (_, id) = popped.ok_or(QueueError::Empty)?;
        Self::load_job(&mut conn, &id).await
    }

    async fn get_job(&self, id: &str) -> Result<DownloadJob, QueueError> {
        let mut conn = self.connection().await?;
        Self::load_job(&mut conn, id).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        progress: f64,
        error: Option<&str>,
    ) -> Result<DownloadJob, QueueError> {
        let mut conn = self.connection().await?;

        let mut job = Self::load_job(&mut conn, id).await?;
        job.apply_update(status, progress, error)?;
        Self::save_job(&mut conn, &job).await?;

        Self::publish_progress(&mut conn, &job).await;
        Ok(job)
    }

    async fn increment_retry(&self, id: &str) -> Result<DownloadJob, QueueError> {
        let mut conn = self.connection().await?;

        let mut job = Self::load_job(&mut conn, id).await?;
        job.begin_retry();
        Self::save_job(&mut conn, &job).await?;

        // requeue at the head: the dequeue side pops from the right
        let _: i64 = conn.rpush(PENDING_LIST_KEY, &job.id).await?;

        Self::publish_progress(&mut conn, &job).await;
        debug!(job_id = %job.id, retry_count = job.retry_count, "job requeued for retry");
        Ok(job)
    }

    async fn queue_length(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.llen(PENDING_LIST_KEY).await?;
        Ok(len)
    }

    async fn list_user_jobs(&self, user_id: i64) -> Result<Vec<DownloadJob>, QueueError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.lrange(user_jobs_key(user_id), 0, -1).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        // newest first; records purged externally are skipped
        for id in ids.iter().rev() {
            match Self::load_job(&mut conn, id).await {
                Ok(job) => jobs.push(job),
                Err(QueueError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }
}
