//! The bounded worker pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Runs request workers with `concurrent` in flight and up to `pending`
/// queued beyond that; once both are full, `spawn` blocks the caller,
/// which is how backpressure reaches the rate-limit groups and the
/// dispatch loop.
pub struct WorkerPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    slots: Arc<Semaphore>,
    token: CancellationToken,
}

impl WorkerPool {
    pub fn new(concurrent: usize, pending: usize) -> Self {
        let concurrent = concurrent.max(1);
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(concurrent)),
            slots: Arc::new(Semaphore::new(concurrent + pending)),
            // Owned by the pool: cancelled only when the close timeout
            // expires, so a cooperative shutdown lets workers finish.
            token: CancellationToken::new(),
        }
    }

    /// Spawns a worker, waiting for a pending slot first.
    pub async fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(slot) = Arc::clone(&self.slots).acquire_owned().await else {
            return;
        };
        let permits = Arc::clone(&self.permits);
        let token = self.token.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            // The pending slot is only held while waiting for a run permit.
            drop(slot);
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("worker cancelled during shutdown");
                }
                _ = future => {}
            }
        });
    }

    /// Unfinished workers, including those still waiting for a permit.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `close_timeout` for workers to drain, then cancels the
    /// stragglers and waits for them to acknowledge.
    pub async fn shutdown(&self, close_timeout: Duration) {
        self.tracker.close();
        if tokio::time::timeout(close_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                "worker pool close timeout expired, cancelling workers"
            );
            self.token.cancel();
            self.tracker.wait().await;
        }
    }
}
