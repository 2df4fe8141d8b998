//! Group-based throttling: one serial worker per group key.

use crate::adaptive::{AdaptiveController, RequestOutcome};
use crate::config::RateLimitConfig;
use async_trait::async_trait;
use scrapekit_core::{Envelope, Request};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Floor applied to group intervals so a zero or negative custom interval
/// cannot busy-spin a group worker.
pub const MIN_GROUP_INTERVAL: Duration = Duration::from_millis(10);

/// Hands a ready envelope to the worker pool. Implemented by the request
/// manager.
#[async_trait]
pub trait DispatchRequest: Send + Sync {
    async fn dispatch(&self, envelope: Envelope);
}

/// A group's pending requests, ordered by priority.
struct GroupQueue {
    heap: Mutex<BinaryHeap<Reverse<Envelope>>>,
    notify: Notify,
}

impl GroupQueue {
    fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, envelope: Envelope) {
        self.heap.lock().unwrap().push(Reverse(envelope));
        self.notify.notify_one();
    }

    /// Waits for the next envelope. Single consumer: only the group's
    /// worker calls this.
    async fn pop(&self) -> Envelope {
        loop {
            if let Some(Reverse(envelope)) = self.heap.lock().unwrap().pop() {
                return envelope;
            }
            self.notify.notified().await;
        }
    }

    fn is_empty(&self) -> bool {
        self.heap.lock().unwrap().is_empty()
    }
}

/// Lock-free holder for a group's current interval, writable by the
/// adaptive controller while the worker sleeps on it.
struct IntervalCell(AtomicU64);

impl IntervalCell {
    fn new(interval: Duration) -> Self {
        Self(AtomicU64::new(Self::to_nanos(interval)))
    }

    fn get(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, interval: Duration) {
        self.0.store(Self::to_nanos(interval), Ordering::Relaxed);
    }

    fn to_nanos(interval: Duration) -> u64 {
        u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX)
    }
}

struct GroupEntry {
    id: u64,
    queue: Arc<GroupQueue>,
    interval: Arc<IntervalCell>,
    handle: JoinHandle<()>,
}

/// Routes envelopes through per-key serial workers.
///
/// At most one group exists per key at any moment. A group worker exits
/// after sitting idle longer than `max(cleanup_timeout, 2 * interval)` and
/// removes its map entry only when the entry still refers to it, so a
/// concurrently re-created group is never evicted by its predecessor.
pub struct RateLimiter {
    config: RateLimitConfig,
    dispatch: Arc<dyn DispatchRequest>,
    groups: Mutex<HashMap<String, GroupEntry>>,
    adaptive: Option<AdaptiveController>,
    token: CancellationToken,
    next_group_id: AtomicU64,
    /// Handed to group workers so their exit path can check the map.
    weak_self: Weak<RateLimiter>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, dispatch: Arc<dyn DispatchRequest>) -> Arc<Self> {
        if config.enabled {
            let grouping = if config.group_by.is_some() { "custom" } else { "by host" };
            tracing::info!(
                grouping,
                default_interval_ms = config.default_interval.as_millis() as u64,
                cleanup_timeout_ms = config.cleanup_timeout.as_millis() as u64,
                adaptive = config.adaptive.is_some(),
                "rate limiting enabled"
            );
        } else if config.default_interval > Duration::ZERO {
            tracing::info!(
                default_interval_ms = config.default_interval.as_millis() as u64,
                "rate limiting disabled, but default_interval will be applied"
            );
        }

        let adaptive = config.adaptive.clone().map(AdaptiveController::new);
        Arc::new_cyclic(|weak| Self {
            config,
            dispatch,
            groups: Mutex::new(HashMap::new()),
            adaptive,
            token: CancellationToken::new(),
            next_group_id: AtomicU64::new(0),
            weak_self: weak.clone(),
        })
    }

    /// The group key and configured interval for a request.
    pub fn group_key(&self, request: &Request) -> (String, Duration) {
        match &self.config.group_by {
            Some(group_by) => group_by(request),
            None => (default_group_key(request), self.config.default_interval),
        }
    }

    /// Routes one envelope. Disabled mode dispatches inline and, when
    /// `default_interval` is positive, sleeps it before returning —
    /// throttling the caller (the dispatch loop) globally.
    pub async fn handle(&self, envelope: Envelope) {
        if !self.config.enabled {
            self.dispatch.dispatch(envelope).await;
            if self.config.default_interval > Duration::ZERO {
                tokio::time::sleep(self.config.default_interval).await;
            }
            return;
        }

        let (key, mut interval) = self.group_key(&envelope.request);
        if interval <= Duration::ZERO {
            interval = MIN_GROUP_INTERVAL;
        }
        if let Some(adaptive) = &self.adaptive {
            interval = adaptive.seed(&key, interval);
        }

        // Push under the map lock: a worker deciding to exit re-checks its
        // queue under this same lock, so a request can never land in a
        // queue whose worker already left.
        let mut groups = self.groups.lock().unwrap();
        let entry = groups
            .entry(key.clone())
            .or_insert_with(|| self.create_group(key.clone(), interval));
        entry.queue.push(envelope);
    }

    fn create_group(&self, key: String, interval: Duration) -> GroupEntry {
        let id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(GroupQueue::new());
        let cell = Arc::new(IntervalCell::new(interval));
        let idle_timeout = self.config.cleanup_timeout.max(interval * 2);

        tracing::debug!(
            group = %key,
            interval_ms = interval.as_millis() as u64,
            idle_timeout_ms = idle_timeout.as_millis() as u64,
            "created rate limit group"
        );

        let handle = tokio::spawn(run_group(
            key.clone(),
            id,
            Arc::clone(&queue),
            Arc::clone(&cell),
            idle_timeout,
            Arc::clone(&self.dispatch),
            self.token.child_token(),
            self.weak_self.clone(),
        ));

        GroupEntry {
            id,
            queue,
            interval: cell,
            handle,
        }
    }

    /// Reports a completed request so the adaptive strategy can decide the
    /// group's next interval. No-op without adaptive configuration.
    pub fn record_outcome(&self, outcome: &RequestOutcome) {
        let Some(adaptive) = &self.adaptive else {
            return;
        };
        let next = adaptive.on_outcome(outcome);
        if let Some(entry) = self.groups.lock().unwrap().get(&outcome.group_key) {
            entry.interval.set(next);
        }
    }

    /// The live interval of a group, when one exists.
    pub fn current_interval(&self, key: &str) -> Option<Duration> {
        self.groups
            .lock()
            .unwrap()
            .get(key)
            .map(|entry| entry.interval.get())
    }

    /// Whether any group still has pending requests.
    pub fn active(&self) -> bool {
        self.groups
            .lock()
            .unwrap()
            .values()
            .any(|entry| !entry.queue.is_empty())
    }

    /// Cancels every group worker and waits for each to exit. Safe to call
    /// more than once.
    pub async fn close(&self) {
        let entries: Vec<GroupEntry> = {
            let mut groups = self.groups.lock().unwrap();
            groups.drain().map(|(_, entry)| entry).collect()
        };
        self.token.cancel();

        if entries.is_empty() {
            tracing::debug!("closing rate limiter: no active groups");
            return;
        }

        tracing::info!(groups = entries.len(), "closing rate limiter");
        for entry in entries {
            let _ = entry.handle.await;
        }
    }
}

fn default_group_key(request: &Request) -> String {
    url::Url::parse(&request.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[allow(clippy::too_many_arguments)]
async fn run_group(
    key: String,
    id: u64,
    queue: Arc<GroupQueue>,
    interval: Arc<IntervalCell>,
    idle_timeout: Duration,
    dispatch: Arc<dyn DispatchRequest>,
    token: CancellationToken,
    limiter: Weak<RateLimiter>,
) {
    loop {
        let envelope = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(group = %key, "rate limit group cancelled");
                return;
            }
            popped = tokio::time::timeout(idle_timeout, queue.pop()) => match popped {
                Ok(envelope) => envelope,
                Err(_) => {
                    let Some(limiter) = limiter.upgrade() else {
                        return;
                    };
                    let mut groups = limiter.groups.lock().unwrap();
                    // An envelope may have raced in while the timeout fired.
                    if !queue.is_empty() {
                        continue;
                    }
                    if groups.get(&key).map(|entry| entry.id) == Some(id) {
                        groups.remove(&key);
                        tracing::debug!(group = %key, "rate limit group idle, removed");
                    }
                    return;
                }
            }
        };

        dispatch.dispatch(envelope).await;

        // Sleep the interval, extending the pause if the adaptive
        // controller raises it while we wait (the outcome of the request
        // just dispatched typically lands mid-sleep).
        let mut slept = Duration::ZERO;
        loop {
            let target = interval.get();
            if target <= slept {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(group = %key, "rate limit group cancelled");
                    return;
                }
                _ = tokio::time::sleep(target - slept) => {
                    slept = target;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdaptiveConfig;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    struct RecordingDispatch {
        stamps: StdMutex<Vec<(String, Instant)>>,
    }

    impl RecordingDispatch {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                stamps: StdMutex::new(Vec::new()),
            })
        }

        fn stamps(&self) -> Vec<(String, Instant)> {
            self.stamps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DispatchRequest for RecordingDispatch {
        async fn dispatch(&self, envelope: Envelope) {
            self.stamps
                .lock()
                .unwrap()
                .push((envelope.request.url.clone(), Instant::now()));
        }
    }

    fn envelope(url: &str, seq: u64) -> Envelope {
        Envelope::new(0, seq, Request::get(url).build().unwrap())
    }

    #[test]
    fn default_group_key_is_host() {
        let request = Request::get("https://example.com/a/b?c=1").build().unwrap();
        assert_eq!(default_group_key(&request), "example.com");
    }

    #[test]
    fn default_group_key_falls_back_for_bad_urls() {
        let request = Request::get("not a url").build().unwrap();
        assert_eq!(default_group_key(&request), "unknown");
    }

    #[tokio::test]
    async fn groups_space_dispatches_by_interval() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .enabled(true)
                .default_interval(Duration::from_millis(100))
                .build(),
            dispatch.clone(),
        );

        for seq in 0..3 {
            limiter.handle(envelope("https://a.test/x", seq)).await;
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        let stamps = dispatch.stamps();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            let gap = pair[1].1.duration_since(pair[0].1);
            assert!(gap >= Duration::from_millis(90), "gap was {gap:?}");
        }
        limiter.close().await;
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .enabled(true)
                .default_interval(Duration::from_millis(200))
                .build(),
            dispatch.clone(),
        );

        limiter.handle(envelope("https://a.test/1", 0)).await;
        limiter.handle(envelope("https://a.test/2", 1)).await;
        limiter.handle(envelope("https://b.test/1", 2)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let stamps = dispatch.stamps();
        // a/1 and b/1 dispatch immediately; a/2 is still waiting.
        assert_eq!(stamps.len(), 2);
        let urls: Vec<_> = stamps.iter().map(|(u, _)| u.as_str()).collect();
        assert!(urls.contains(&"https://a.test/1"));
        assert!(urls.contains(&"https://b.test/1"));
        limiter.close().await;
    }

    #[tokio::test]
    async fn custom_interval_is_clamped() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .enabled(true)
                .group_by(|_request| ("g".to_string(), Duration::ZERO))
                .build(),
            dispatch.clone(),
        );

        limiter.handle(envelope("https://a.test/1", 0)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.current_interval("g"), Some(MIN_GROUP_INTERVAL));
        limiter.close().await;
    }

    #[tokio::test]
    async fn idle_group_is_removed() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .enabled(true)
                .default_interval(Duration::from_millis(10))
                .cleanup_timeout(Duration::from_millis(50))
                .build(),
            dispatch.clone(),
        );

        limiter.handle(envelope("https://a.test/1", 0)).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(limiter.current_interval("a.test").is_none());
        assert!(!limiter.active());
        limiter.close().await;
    }

    #[tokio::test]
    async fn disabled_mode_sleeps_default_interval() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .default_interval(Duration::from_millis(80))
                .build(),
            dispatch.clone(),
        );

        let started = Instant::now();
        limiter.handle(envelope("https://a.test/1", 0)).await;
        assert!(started.elapsed() >= Duration::from_millis(75));
        assert_eq!(dispatch.stamps().len(), 1);
        limiter.close().await;
    }

    #[tokio::test]
    async fn disabled_mode_without_interval_does_not_sleep() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(RateLimitConfig::default(), dispatch.clone());

        let started = Instant::now();
        limiter.handle(envelope("https://a.test/1", 0)).await;
        assert!(started.elapsed() < Duration::from_millis(20));
        limiter.close().await;
    }

    #[tokio::test]
    async fn close_twice_is_noop() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .enabled(true)
                .default_interval(Duration::from_millis(10))
                .build(),
            dispatch.clone(),
        );
        limiter.handle(envelope("https://a.test/1", 0)).await;
        limiter.close().await;
        limiter.close().await;
    }

    #[tokio::test]
    async fn record_outcome_updates_live_group_interval() {
        let dispatch = RecordingDispatch::new();
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .enabled(true)
                .default_interval(Duration::from_millis(100))
                .adaptive(AdaptiveConfig::builder().increase_factor(2.0).build())
                .build(),
            dispatch.clone(),
        );

        limiter.handle(envelope("https://a.test/1", 0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        limiter.record_outcome(&RequestOutcome {
            group_key: "a.test".to_string(),
            latency: Duration::from_millis(40),
            retry_after: None,
            status: Some(http::StatusCode::SERVICE_UNAVAILABLE),
            error_kind: None,
        });
        assert_eq!(
            limiter.current_interval("a.test"),
            Some(Duration::from_millis(200))
        );
        limiter.close().await;
    }
}
