//! The retry middleware itself.

use crate::config::RetryConfig;
use async_trait::async_trait;
use scrapekit_core::headers::retry_after_from_headers;
use scrapekit_core::{EngineContext, ExceptionMiddleware, Flow, Request, ScrapeError};
use std::time::Duration;

/// Request-state key holding the attempt counter. Reserved by this
/// middleware.
pub const RETRY_ATTEMPTS_STATE_KEY: &str = "scrapekit.retry.attempts";

/// Exception-stage middleware that re-submits failed requests.
///
/// The failing request's attempt counter lives in its state map, so a
/// re-submitted clone carries the count along and the cap holds across
/// the request's whole lifetime.
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        if config.enabled {
            tracing::info!(
                attempts = config.attempts,
                backoff = %config.backoff,
                "retry middleware enabled"
            );
        }
        Self { config }
    }

    fn should_retry(&self, error: &ScrapeError) -> bool {
        if let Some(status) = error.status() {
            if self.config.statuses.contains(&status.as_u16()) {
                return true;
            }
        }
        self.config.error_kinds.contains(&error.kind())
    }

    fn next_delay(&self, attempt: u32, error: &ScrapeError) -> Duration {
        if let Some(retry_after) = error.response_headers().and_then(retry_after_from_headers) {
            tracing::debug!(delay_ms = retry_after.as_millis() as u64, "using Retry-After");
            return retry_after;
        }
        self.config
            .backoff
            .delay(attempt, self.config.base_delay, self.config.max_delay)
    }
}

#[async_trait]
impl ExceptionMiddleware for RetryMiddleware {
    async fn handle(
        &self,
        request: &mut Request,
        error: &ScrapeError,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError> {
        if !self.config.enabled || !self.should_retry(error) {
            return Ok(Flow::Continue);
        }

        let used = request
            .state
            .get::<u32>(RETRY_ATTEMPTS_STATE_KEY)
            .copied()
            .unwrap_or(0);
        if used >= self.config.attempts {
            tracing::debug!(
                url = %request.url,
                attempts = used,
                "retry attempts exhausted"
            );
            return Ok(Flow::Continue);
        }

        let attempt = used + 1;
        let delay = self.next_delay(attempt, error);
        request.state.insert(RETRY_ATTEMPTS_STATE_KEY, attempt);

        let mut retry = request.clone();
        retry.delay = Some(delay);

        tracing::debug!(
            url = %retry.url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling retry"
        );
        cx.send(retry).await?;

        if self.config.stop_processing {
            Ok(Flow::StopRequest)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackoffStrategy;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use scrapekit_core::SendRequest;
    use std::sync::{Arc, Mutex};

    struct CapturingSender {
        sent: Mutex<Vec<Request>>,
    }

    impl CapturingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn take(&self) -> Vec<Request> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    #[async_trait]
    impl SendRequest for CapturingSender {
        async fn send(&self, request: Request) -> Result<(), ScrapeError> {
            self.sent.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn cx(sender: Arc<CapturingSender>) -> EngineContext {
        EngineContext::new(sender, Arc::new(http::Extensions::new()))
    }

    fn http_error(status: StatusCode, headers: HeaderMap) -> ScrapeError {
        ScrapeError::http(
            "https://example.com/x",
            Method::GET,
            status,
            headers,
            Bytes::new(),
        )
    }

    fn config() -> RetryConfig {
        RetryConfig::builder()
            .enabled(true)
            .attempts(2)
            .backoff(BackoffStrategy::Constant)
            .base_delay(Duration::from_millis(50))
            .statuses(vec![502, 429])
            .build()
    }

    #[tokio::test]
    async fn matching_status_schedules_retry_with_delay() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(config());
        let mut request = Request::get("https://example.com/x").build().unwrap();

        let flow = mw
            .handle(
                &mut request,
                &http_error(StatusCode::BAD_GATEWAY, HeaderMap::new()),
                &cx(sender.clone()),
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::StopRequest);
        let sent = sender.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].delay, Some(Duration::from_millis(50)));
        assert_eq!(
            sent[0].state.get::<u32>(RETRY_ATTEMPTS_STATE_KEY),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn attempt_counter_caps_retries() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(config());
        let error = http_error(StatusCode::BAD_GATEWAY, HeaderMap::new());
        let context = cx(sender.clone());

        let mut request = Request::get("https://example.com/x").build().unwrap();
        // First failure retries, second retries, third is exhausted.
        for expected in [1u32, 2] {
            mw.handle(&mut request, &error, &context).await.unwrap();
            let sent = sender.take();
            assert_eq!(sent.len(), 1);
            assert_eq!(
                sent[0].state.get::<u32>(RETRY_ATTEMPTS_STATE_KEY),
                Some(&expected)
            );
            request = sent.into_iter().next().unwrap();
        }

        let flow = mw.handle(&mut request, &error, &context).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert!(sender.take().is_empty());
    }

    #[tokio::test]
    async fn non_matching_error_is_ignored() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(config());
        let mut request = Request::get("https://example.com/x").build().unwrap();

        let flow = mw
            .handle(
                &mut request,
                &http_error(StatusCode::NOT_FOUND, HeaderMap::new()),
                &cx(sender.clone()),
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(sender.take().is_empty());
    }

    #[tokio::test]
    async fn disabled_middleware_never_retries() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(RetryConfig::default());
        let mut request = Request::get("https://example.com/x").build().unwrap();

        let flow = mw
            .handle(
                &mut request,
                &http_error(StatusCode::BAD_GATEWAY, HeaderMap::new()),
                &cx(sender.clone()),
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(sender.take().is_empty());
    }

    #[tokio::test]
    async fn error_kind_triggers_retry() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(config());
        let mut request = Request::get("https://example.com/x").build().unwrap();

        let flow = mw
            .handle(&mut request, &ScrapeError::Timeout, &cx(sender.clone()))
            .await
            .unwrap();

        assert_eq!(flow, Flow::StopRequest);
        assert_eq!(sender.take().len(), 1);
    }

    #[tokio::test]
    async fn retry_after_header_overrides_backoff() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(config());
        let mut request = Request::get("https://example.com/x").build().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static("3"));
        mw.handle(
            &mut request,
            &http_error(StatusCode::TOO_MANY_REQUESTS, headers),
            &cx(sender.clone()),
        )
        .await
        .unwrap();

        let sent = sender.take();
        assert_eq!(sent[0].delay, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn stop_processing_false_continues_chain() {
        let sender = CapturingSender::new();
        let mw = RetryMiddleware::new(
            RetryConfig::builder()
                .enabled(true)
                .statuses(vec![502])
                .stop_processing(false)
                .build(),
        );
        let mut request = Request::get("https://example.com/x").build().unwrap();

        let flow = mw
            .handle(
                &mut request,
                &http_error(StatusCode::BAD_GATEWAY, HeaderMap::new()),
                &cx(sender.clone()),
            )
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(sender.take().len(), 1);
    }
}
