//! Per-user progress fan-out
//!
//! Forwards decoded job records from a user's pub/sub channel to any number
//! of local subscribers. A subscription is an owning handle: dropping the
//! last one for a user tears down the upstream pub/sub task. Slow
//! subscribers with a full buffer are dropped rather than buffered without
//! bound, so one stuck consumer never blocks the rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::DownloadJob;
use crate::queue::job_queue::progress_channel;

const SUBSCRIBER_BUFFER: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type Registry = Arc<Mutex<HashMap<i64, UserChannel>>>;

struct UserChannel {
    subscribers: HashMap<u64, mpsc::Sender<DownloadJob>>,
    pump: JoinHandle<()>,
}

/// Fan-out hub, one per process
pub struct ProgressFanout {
    redis: redis::Client,
    users: Registry,
    next_subscriber_id: AtomicU64,
}

impl ProgressFanout {
    pub fn new(redis: redis::Client) -> Self {
        Self {
            redis,
            users: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for a user's progress updates. The first
    /// subscriber for a user starts the upstream pub/sub pump.
    pub fn subscribe(&self, user_id: i64) -> ProgressSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);

        let mut users = self.users.lock();
        match users.get_mut(&user_id) {
            Some(channel) => {
                channel.subscribers.insert(subscriber_id, tx);
            }
            None => {
                let pump = tokio::spawn(pump_user_channel(
                    self.redis.clone(),
                    user_id,
                    Arc::clone(&self.users),
                ));
                let mut subscribers = HashMap::new();
                subscribers.insert(subscriber_id, tx);
                users.insert(user_id, UserChannel { subscribers, pump });
            }
        }
        drop(users);

        debug!(user_id, subscriber_id, "progress subscriber registered");
        ProgressSubscription {
            user_id,
            subscriber_id,
            rx,
            users: Arc::clone(&self.users),
        }
    }

    /// Number of users with live subscriptions
    pub fn active_users(&self) -> usize {
        self.users.lock().len()
    }
}

/// Deliver one record to a user's subscribers, dropping any whose buffer is
/// full or whose receiver is gone. Returns false once no subscribers remain.
fn dispatch(users: &Registry, user_id: i64, job: &DownloadJob) -> bool {
    let mut guard = users.lock();

    let empty = match guard.get_mut(&user_id) {
        None => return false,
        Some(channel) => {
            let mut dropped = Vec::new();
            for (id, tx) in &channel.subscribers {
                match tx.try_send(job.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                        dropped.push(*id)
                    }
                }
            }
            for id in &dropped {
                channel.subscribers.remove(id);
            }
            if !dropped.is_empty() {
                debug!(user_id, dropped = dropped.len(), "dropped slow progress subscribers");
            }
            channel.subscribers.is_empty()
        }
    };

    if empty {
        guard.remove(&user_id);
        return false;
    }
    true
}

/// Long-lived pub/sub pump for one user. Reconnects on transport errors and
/// exits once the user has no subscribers left.
async fn pump_user_channel(client: redis::Client, user_id: i64, users: Registry) {
    let channel = progress_channel(user_id);

    loop {
        if !users.lock().contains_key(&user_id) {
            break;
        }

        match run_pubsub(&client, &channel, user_id, &users).await {
            Ok(()) => break,
            Err(e) => {
                debug!(user_id, "progress pump reconnecting after error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!(user_id, "progress pump stopped");
}

async fn run_pubsub(
    client: &redis::Client,
    channel: &str,
    user_id: i64,
    users: &Registry,
) -> Result<(), redis::RedisError> {
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.subscribe(channel).await?;
    let mut stream = pubsub.on_message();

    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(user_id, "unreadable progress payload: {}", e);
                continue;
            }
        };
        let job: DownloadJob = match serde_json::from_str(&payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(user_id, "corrupt progress payload: {}", e);
                continue;
            }
        };

        if !dispatch(users, user_id, &job) {
            return Ok(());
        }
    }

    Ok(())
}

/// An owning handle on a progress subscription
pub struct ProgressSubscription {
    user_id: i64,
    subscriber_id: u64,
    rx: mpsc::Receiver<DownloadJob>,
    users: Registry,
}

impl ProgressSubscription {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Next progress record; `None` once the subscription was dropped by
    /// the fan-out (slow consumer) or the pump ended.
    pub async fn recv(&mut self) -> Option<DownloadJob> {
        self.rx.recv().await
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        let mut users = self.users.lock();
        let empty = match users.get_mut(&self.user_id) {
            Some(channel) => {
                channel.subscribers.remove(&self.subscriber_id);
                channel.subscribers.is_empty()
            }
            None => false,
        };
        if empty {
            if let Some(channel) = users.remove(&self.user_id) {
                channel.pump.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, SourceType};

    fn test_job() -> DownloadJob {
        DownloadJob::new(
            1,
            "https://youtube.com/watch?v=abc".into(),
            SourceType::Youtube,
            None,
        )
    }

    fn fanout() -> ProgressFanout {
        // nothing listens on this port; the pump just retries in the
        // background while the registry logic is exercised
        ProgressFanout::new(redis::Client::open("redis://127.0.0.1:1/").unwrap())
    }

    #[tokio::test]
    async fn test_subscribe_and_drop_bookkeeping() {
        let fanout = fanout();
        assert_eq!(fanout.active_users(), 0);

        let sub_a = fanout.subscribe(7);
        let sub_b = fanout.subscribe(7);
        let sub_other = fanout.subscribe(8);
        assert_eq!(fanout.active_users(), 2);
        assert_eq!(sub_a.user_id(), 7);

        drop(sub_a);
        // user 7 still has a live subscriber
        assert_eq!(fanout.active_users(), 2);

        drop(sub_b);
        assert_eq!(fanout.active_users(), 1);

        drop(sub_other);
        assert_eq!(fanout.active_users(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_delivers_to_all_subscribers() {
        let fanout = fanout();
        let mut sub_a = fanout.subscribe(7);
        let mut sub_b = fanout.subscribe(7);

        let mut job = test_job();
        job.apply_update(JobStatus::Downloading, 42.0, None).unwrap();

        assert!(dispatch(&fanout.users, 7, &job));

        let got_a = sub_a.recv().await.unwrap();
        let got_b = sub_b.recv().await.unwrap();
        assert_eq!(got_a.progress, 42.0);
        assert_eq!(got_b.id, got_a.id);
    }

    #[tokio::test]
    async fn test_slow_subscriber_dropped() {
        let fanout = fanout();
        let mut fast = fanout.subscribe(7);
        let slow = fanout.subscribe(7);

        let job = test_job();
        // overflow the slow subscriber's buffer without draining it
        for _ in 0..(SUBSCRIBER_BUFFER + 1) {
            dispatch(&fanout.users, 7, &job);
            // keep the fast one drained
            let _ = fast.recv().await;
        }

        // the slow subscriber was removed, the fast one still works
        let subscribers_left = fanout
            .users
            .lock()
            .get(&7)
            .map(|c| c.subscribers.len())
            .unwrap_or(0);
        assert_eq!(subscribers_left, 1);

        assert!(dispatch(&fanout.users, 7, &job));
        assert!(fast.recv().await.is_some());

        drop(slow);
        drop(fast);
        assert_eq!(fanout.active_users(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_without_subscribers() {
        let fanout = fanout();
        assert!(!dispatch(&fanout.users, 99, &test_job()));
    }
}
