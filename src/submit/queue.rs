//! Per-account submission ordering
//!
//! Every job that consumes a sequence number of an account runs inside that
//! account's lane. Lanes are `tokio::sync::Mutex`es, whose waiters are woken in
//! FIFO order, so jobs on one account run one at a time in enqueue order while
//! different accounts proceed independently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct AccountSequenceQueue {
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AccountSequenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run `job` once every earlier job for `account_id` has finished
    pub async fn enqueue<F, Fut, T>(&self, account_id: &str, job: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lane = self.lane(account_id);
        let _turn = lane.lock().await;
        tracing::trace!(account = %account_id, "Account lane acquired");
        job().await
    }

    /// Number of accounts seen so far
    pub fn accounts(&self) -> usize {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn same_account_jobs_do_not_interleave() {
        let queue = AccountSequenceQueue::new();
        let log = AsyncMutex::new(Vec::new());

        let job = |name: &'static str, pause: u64| {
            let log = &log;
            move || async move {
                log.lock().await.push(format!("{}-start", name));
                tokio::time::sleep(Duration::from_millis(pause)).await;
                log.lock().await.push(format!("{}-end", name));
            }
        };

        tokio::join!(
            queue.enqueue("GACCOUNT", job("first", 30)),
            queue.enqueue("GACCOUNT", job("second", 0)),
        );

        assert_eq!(
            *log.lock().await,
            vec!["first-start", "first-end", "second-start", "second-end"]
        );
        assert_eq!(queue.accounts(), 1);
    }

    #[tokio::test]
    async fn different_accounts_run_independently() {
        let queue = AccountSequenceQueue::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // The first job waits for the second; this only completes if the
        // accounts do not share a lane.
        let waiting = queue.enqueue("GA", || async move {
            rx.await.unwrap();
            "a"
        });
        let releasing = queue.enqueue("GB", || async move {
            tx.send(()).unwrap();
            "b"
        });

        let result = tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(waiting, releasing)
        })
        .await
        .unwrap();
        assert_eq!(result, ("a", "b"));
    }

    #[tokio::test]
    async fn failed_job_releases_the_lane() {
        let queue = AccountSequenceQueue::new();
        let failed: Result<(), &str> = queue.enqueue("GA", || async { Err("boom") }).await;
        assert!(failed.is_err());
        let ok = queue.enqueue("GA", || async { 7 }).await;
        assert_eq!(ok, 7);
    }
}
