//! Download pipeline: durable queue, worker pool, progress fan-out

pub mod job_queue;
pub mod progress;
pub mod worker;

pub use job_queue::{progress_channel, JobQueue, QueueError, RedisJobQueue};
pub use progress::{ProgressFanout, ProgressSubscription};
pub use worker::{
    backoff_delay, JobProcessor, ProcessError, ProgressSink, WorkerPool, WorkerPoolConfig,
};
