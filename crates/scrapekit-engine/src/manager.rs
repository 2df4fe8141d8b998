//! The request manager: sender, dispatch loop, and per-request worker
//! stages.

use crate::pool::WorkerPool;
use crate::queue::{DelayHeap, ReadyQueue};
use crate::session::Session;
use crate::SchedulerConfig;
use async_trait::async_trait;
use http::{Extensions, Method, StatusCode};
use scrapekit_core::headers::retry_after_from_headers;
use scrapekit_core::{
    DelayedEnvelope, EngineContext, Envelope, ErrorKind, Flow, MiddlewareRegistry, Request,
    ScrapeError, SendRequest, StateMap,
};
use scrapekit_ratelimit::{DispatchRequest, RateLimitConfig, RateLimiter, RequestOutcome};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Sentinel priority: sorts after every real request so the queue drains
/// before the dispatch loop observes the close.
const SENTINEL_PRIORITY: i32 = i32::MAX;

fn sentinel_request() -> Request {
    Request {
        url: "stub://closed".to_string(),
        method: Method::GET,
        params: Vec::new(),
        body: None,
        json: None,
        files: None,
        cookies: Vec::new(),
        headers: http::HeaderMap::new(),
        auth: None,
        proxy: None,
        proxy_auth: None,
        proxy_headers: http::HeaderMap::new(),
        timeout: None,
        allow_redirects: true,
        max_redirects: 10,
        raise_for_status: true,
        priority: SENTINEL_PRIORITY,
        delay: None,
        callback: None,
        cb_args: StateMap::new(),
        errback: None,
        state: StateMap::new(),
    }
}

/// Submits requests into the two-queue scheduler.
struct QueueSender {
    ready: Arc<ReadyQueue>,
    delayed: Arc<DelayHeap>,
    /// Wakes the dispatch loop when a delayed request lands, so an earlier
    /// due time shortens the current wait.
    wake: Arc<Notify>,
    seq: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SendRequest for QueueSender {
    async fn send(&self, request: Request) -> Result<(), ScrapeError> {
        request.validate()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScrapeError::Closed);
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        match request.delay {
            Some(delay) => {
                self.delayed
                    .push(DelayedEnvelope::new(Instant::now() + delay, seq, request));
                self.wake.notify_one();
            }
            None => {
                let envelope = Envelope::new(request.priority, seq, request);
                self.ready.push(envelope).await;
            }
        }
        Ok(())
    }
}

/// Hands rate-limited envelopes to the worker pool.
struct PoolDispatch {
    manager: Weak<RequestManager>,
}

#[async_trait]
impl DispatchRequest for PoolDispatch {
    async fn dispatch(&self, envelope: Envelope) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let worker = Arc::clone(&manager);
        manager
            .pool
            .spawn(async move {
                worker.process_request(envelope.request).await;
            })
            .await;
    }
}

/// How the worker stages ended, for adaptive outcome reporting.
enum StageResult {
    /// The transport produced a response (ok or not).
    Completed {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    /// The request failed before or after the transport call.
    Failed {
        status: Option<StatusCode>,
        retry_after: Option<Duration>,
        kind: ErrorKind,
    },
    /// A middleware stopped processing before the transport was reached.
    Aborted,
}

/// Owns the scheduler queues, the middleware walk, the transport call, and
/// error routing for every request.
pub struct RequestManager {
    ready: Arc<ReadyQueue>,
    delayed: Arc<DelayHeap>,
    wake: Arc<Notify>,
    closed: Arc<AtomicBool>,
    registry: Arc<MiddlewareRegistry>,
    session: Arc<dyn Session>,
    limiter: Arc<RateLimiter>,
    pool: WorkerPool,
    context: EngineContext,
    /// Dispatch wait slice when the delayed heap is empty.
    check_slice: Duration,
    adaptive_enabled: bool,
}

impl RequestManager {
    pub fn new(
        scheduler: &SchedulerConfig,
        rate_limit: RateLimitConfig,
        session: Arc<dyn Session>,
        registry: Arc<MiddlewareRegistry>,
        deps: Arc<Extensions>,
        check_slice: Duration,
    ) -> Arc<Self> {
        let ready = Arc::new(ReadyQueue::new(scheduler.ready_queue_max_size));
        let delayed = Arc::new(DelayHeap::new());
        let wake = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));
        let adaptive_enabled = rate_limit.adaptive.is_some();

        let sender: Arc<dyn SendRequest> = Arc::new(QueueSender {
            ready: Arc::clone(&ready),
            delayed: Arc::clone(&delayed),
            wake: Arc::clone(&wake),
            seq: Arc::new(AtomicU64::new(0)),
            closed: Arc::clone(&closed),
        });
        let context = EngineContext::new(sender, deps);

        Arc::new_cyclic(|weak: &Weak<RequestManager>| {
            let limiter = RateLimiter::new(
                rate_limit,
                Arc::new(PoolDispatch {
                    manager: weak.clone(),
                }),
            );
            RequestManager {
                ready,
                delayed,
                wake,
                closed,
                registry,
                session,
                limiter,
                pool: WorkerPool::new(scheduler.concurrent_requests, scheduler.pending_requests),
                context,
                check_slice,
                adaptive_enabled,
            }
        })
    }

    /// The sender producers and callbacks submit through.
    pub fn sender(&self) -> Arc<dyn SendRequest> {
        Arc::clone(self.context.sender())
    }

    /// The context injected into producers and handlers.
    pub fn context(&self) -> EngineContext {
        self.context.clone()
    }

    /// The rate limiter owned by this manager.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Whether any work remains queued, delayed, grouped, or in flight.
    pub fn active(&self) -> bool {
        !self.ready.is_empty()
            || !self.delayed.is_empty()
            || self.limiter.active()
            || self.pool.active() > 0
    }

    /// The cooperative dispatch loop. Runs until [`Self::request_stop`].
    pub async fn run(self: Arc<Self>) {
        loop {
            // Promote everything that has come due. The loop is the ready
            // queue's only consumer, so a full queue puts the envelope
            // back instead of waiting on itself.
            let now = Instant::now();
            while let Some(mut due) = self.delayed.pop_due(now) {
                due.request.delay = None;
                let envelope = Envelope::new(due.request.priority, due.seq, due.request);
                if let Err(rejected) = self.ready.try_push(envelope) {
                    self.delayed
                        .push(DelayedEnvelope::new(now, rejected.seq, rejected.request));
                    break;
                }
            }

            // Wait bounded either by the next due time or the check slice.
            let wait = match self.delayed.next_due() {
                Some(due) => due.saturating_duration_since(Instant::now()),
                None => self.check_slice,
            };
            let envelope = tokio::select! {
                envelope = self.ready.pop() => Some(envelope),
                _ = tokio::time::sleep(wait) => None,
                _ = self.wake.notified() => None,
            };
            let Some(mut envelope) = envelope else {
                continue;
            };

            if self.closed.load(Ordering::SeqCst) {
                tracing::debug!("dispatch loop stopping");
                break;
            }

            // Outer middlewares are observers: failures are logged and
            // control flow cannot abort the loop.
            for middleware in self.registry.outer() {
                match middleware.handle(&mut envelope.request, &self.context).await {
                    Ok(Flow::Continue) => {}
                    Ok(flow) => {
                        tracing::debug!(?flow, "control flow in outer middleware is ignored");
                    }
                    Err(error) => {
                        tracing::error!(
                            middleware = middleware.name(),
                            %error,
                            "outer middleware failed"
                        );
                    }
                }
            }

            self.limiter.handle(envelope).await;
        }
    }

    /// Flags the loop closed and unblocks a pending dequeue.
    pub fn request_stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready
            .push_unbounded(Envelope::new(SENTINEL_PRIORITY, u64::MAX, sentinel_request()));
    }

    /// Closes the rate limiter (awaiting each group) and the transport.
    pub async fn close_resources(&self) {
        self.limiter.close().await;
        self.session.close().await;
    }

    /// Drains the worker pool bounded by `close_timeout`.
    pub async fn shutdown_pool(&self, close_timeout: Duration) {
        self.pool.shutdown(close_timeout).await;
    }

    async fn process_request(self: Arc<Self>, mut request: Request) {
        let group_key = self
            .adaptive_enabled
            .then(|| self.limiter.group_key(&request).0);
        let started = Instant::now();

        let result = self.run_stages(&mut request).await;

        let Some(group_key) = group_key else {
            return;
        };
        let latency = started.elapsed();
        let outcome = match result {
            StageResult::Completed {
                status,
                retry_after,
            } => RequestOutcome {
                group_key,
                latency,
                retry_after,
                status: Some(status),
                error_kind: None,
            },
            StageResult::Failed {
                status,
                retry_after,
                kind,
            } => RequestOutcome {
                group_key,
                latency,
                retry_after,
                status,
                error_kind: Some(kind),
            },
            StageResult::Aborted => return,
        };
        self.limiter.record_outcome(&outcome);
    }

    async fn run_stages(&self, request: &mut Request) -> StageResult {
        for middleware in self.registry.inner() {
            match middleware.handle(request, &self.context).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::StopChain) => {
                    tracing::debug!("inner middleware stopped the chain");
                    break;
                }
                Ok(Flow::StopRequest) => {
                    tracing::debug!("inner middleware aborted request processing");
                    return StageResult::Aborted;
                }
                Err(error) => return self.fail(request, error).await,
            }
        }

        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = match self.session.perform(request).await {
            Ok(response) => response,
            Err(error) => return self.fail(request, error).await,
        };

        for middleware in self.registry.response() {
            match middleware.handle(request, &response, &self.context).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::StopChain) => {
                    tracing::debug!("response middleware stopped the chain");
                    break;
                }
                Ok(Flow::StopRequest) => {
                    tracing::debug!("response middleware aborted request processing");
                    return StageResult::Completed {
                        status: response.status,
                        retry_after: retry_after_from_headers(&response.headers),
                    };
                }
                Err(error) => return self.fail(request, error).await,
            }
        }

        let status = response.status;
        let retry_after = retry_after_from_headers(&response.headers);

        if response.ok() || !request.raise_for_status {
            if let Some(callback) = request.callback.clone() {
                if let Err(error) = callback.on_response(request, &response, &self.context).await {
                    return self.fail(request, error).await;
                }
            }
            StageResult::Completed {
                status,
                retry_after,
            }
        } else {
            let error = ScrapeError::http(
                response.url.clone(),
                response.method.clone(),
                status,
                response.headers.clone(),
                response.body.clone(),
            );
            self.fail(request, error).await
        }
    }

    async fn fail(&self, request: &mut Request, error: ScrapeError) -> StageResult {
        let status = error.status();
        let retry_after = error.response_headers().and_then(retry_after_from_headers);
        let kind = error.kind();
        let failed = StageResult::Failed {
            status,
            retry_after,
            kind,
        };

        for middleware in self.registry.exception() {
            match middleware.handle(request, &error, &self.context).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::StopChain) => {
                    tracing::debug!("exception middleware stopped the chain");
                    break;
                }
                Ok(Flow::StopRequest) => {
                    tracing::debug!("exception middleware aborted request processing");
                    return failed;
                }
                Err(middleware_error) => {
                    tracing::error!(
                        middleware = middleware.name(),
                        error = %middleware_error,
                        "exception middleware failed"
                    );
                }
            }
        }

        if let Some(errback) = request.errback.clone() {
            if let Err(errback_error) = errback.on_error(request, &error, &self.context).await {
                let aggregated = ScrapeError::Errback {
                    original: Box::new(error),
                    errback_error: Box::new(errback_error),
                };
                tracing::error!(
                    method = %request.method,
                    url = %request.url,
                    error = %aggregated,
                    "errback failed"
                );
            }
        } else {
            tracing::error!(
                method = %request.method,
                url = %request.url,
                %error,
                "request failed"
            );
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapekit_core::{callback_fn, errback_fn, request_middleware_fn, Response};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Scripted transport: answers by URL path.
    struct ScriptedSession {
        statuses: Mutex<Vec<StatusCode>>,
        calls: AtomicUsize,
    }

    impl ScriptedSession {
        fn new(statuses: Vec<StatusCode>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn perform(&self, request: &Request) -> Result<Response, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = {
                let mut statuses = self.statuses.lock().unwrap();
                if statuses.is_empty() {
                    StatusCode::OK
                } else {
                    statuses.remove(0)
                }
            };
            Ok(Response {
                url: request.url.clone(),
                method: request.method.clone(),
                status,
                headers: http::HeaderMap::new(),
                cookies: Vec::new(),
                body: bytes::Bytes::from_static(b"{}"),
            })
        }
    }

    fn manager_with(
        session: Arc<dyn Session>,
        registry: MiddlewareRegistry,
    ) -> Arc<RequestManager> {
        RequestManager::new(
            &SchedulerConfig::default(),
            RateLimitConfig::default(),
            session,
            Arc::new(registry),
            Arc::new(Extensions::new()),
            Duration::from_millis(50),
        )
    }

    async fn run_until_idle(manager: &Arc<RequestManager>) {
        let handle = tokio::spawn(Arc::clone(manager).run());
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !manager.active() {
                break;
            }
        }
        manager.request_stop();
        let _ = handle.await;
        manager.shutdown_pool(Duration::from_millis(200)).await;
        manager.close_resources().await;
    }

    #[tokio::test]
    async fn callback_runs_once_on_ok_response() {
        let session = ScriptedSession::new(vec![StatusCode::OK]);
        let manager = manager_with(session.clone(), MiddlewareRegistry::new());

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let request = Request::get("https://example.com/ok")
            .callback(callback_fn(move |_request, response, _cx| {
                let seen = Arc::clone(&seen);
                let ok = response.ok();
                Box::pin(async move {
                    assert!(ok);
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        manager.sender().send(request).await.unwrap();
        run_until_idle(&manager).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_ok_response_routes_to_errback() {
        let session = ScriptedSession::new(vec![StatusCode::INTERNAL_SERVER_ERROR]);
        let manager = manager_with(session.clone(), MiddlewareRegistry::new());

        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let request = Request::get("https://example.com/boom")
            .errback(errback_fn(move |_request, error, _cx| {
                let seen = Arc::clone(&seen);
                let status = error.status();
                Box::pin(async move {
                    assert_eq!(status, Some(StatusCode::INTERNAL_SERVER_ERROR));
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        manager.sender().send(request).await.unwrap();
        run_until_idle(&manager).await;

        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn raise_for_status_false_still_calls_callback() {
        let session = ScriptedSession::new(vec![StatusCode::INTERNAL_SERVER_ERROR]);
        let manager = manager_with(session.clone(), MiddlewareRegistry::new());

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let request = Request::get("https://example.com/any")
            .raise_for_status(false)
            .callback(callback_fn(move |_request, _response, _cx| {
                let seen = Arc::clone(&seen);
                Box::pin(async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        manager.sender().send(request).await.unwrap();
        run_until_idle(&manager).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_request_in_inner_middleware_skips_transport() {
        let session = ScriptedSession::new(vec![]);
        let mut registry = MiddlewareRegistry::new();
        registry.add_inner(
            100,
            request_middleware_fn(|_request, _cx| {
                Box::pin(async move { Ok(Flow::StopRequest) })
            }),
        );
        let manager = manager_with(session.clone(), registry);

        manager
            .sender()
            .send(Request::get("https://example.com/skip").build().unwrap())
            .await
            .unwrap();
        run_until_idle(&manager).await;

        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delayed_request_is_promoted_after_due_time() {
        let session = ScriptedSession::new(vec![]);
        let manager = manager_with(session.clone(), MiddlewareRegistry::new());

        let submitted = Instant::now();
        let dispatched = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&dispatched);
        let request = Request::get("https://example.com/later")
            .delay(Duration::from_millis(150))
            .callback(callback_fn(move |_request, _response, _cx| {
                let seen = Arc::clone(&seen);
                Box::pin(async move {
                    *seen.lock().unwrap() = Some(Instant::now());
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        manager.sender().send(request).await.unwrap();
        run_until_idle(&manager).await;

        let when = dispatched.lock().unwrap().expect("callback ran");
        assert!(when.duration_since(submitted) >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn sender_rejects_after_stop() {
        let session = ScriptedSession::new(vec![]);
        let manager = manager_with(session, MiddlewareRegistry::new());
        let handle = tokio::spawn(Arc::clone(&manager).run());
        manager.request_stop();
        let _ = handle.await;

        let result = manager
            .sender()
            .send(Request::get("https://example.com").build().unwrap())
            .await;
        assert!(matches!(result, Err(ScrapeError::Closed)));
    }

    #[tokio::test]
    async fn sender_revalidates_conflicting_body() {
        let session = ScriptedSession::new(vec![]);
        let manager = manager_with(session, MiddlewareRegistry::new());

        let mut request = Request::post("https://example.com").build().unwrap();
        request.body = Some(scrapekit_core::Body::Bytes(bytes::Bytes::from_static(b"x")));
        request.json = Some(serde_json::json!({"a": 1}));

        let result = manager.sender().send(request).await;
        assert!(matches!(result, Err(ScrapeError::InvalidRequest(_))));
        manager.request_stop();
    }
}
