//! Handler traits for the seams of the engine.
//!
//! Each handler receives exactly the typed inputs its stage provides
//! through a shared [`EngineContext`]; there is no dynamic argument
//! matching. Middlewares steer the chain with [`Flow`] return values,
//! failures use [`ScrapeError`].
//!
//! The `*_fn` adapters wrap closures for quick registration: the closure
//! inspects its arguments synchronously and returns the future doing the
//! async work. Handlers that need to borrow across await points implement
//! the trait directly.
//!
//! ```
//! use scrapekit_core::callback_fn;
//!
//! let cb = callback_fn(|_request, response, _cx| {
//!     let status = response.status;
//!     Box::pin(async move {
//!         println!("got {status}");
//!         Ok(())
//!     })
//! });
//! # let _ = cb;
//! ```

use crate::{EngineContext, Flow, Request, Response, ScrapeError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Enqueues a request into the engine. Producers, callbacks, and the retry
/// middleware all submit through this.
#[async_trait]
pub trait SendRequest: Send + Sync {
    async fn send(&self, request: Request) -> Result<(), ScrapeError>;
}

/// Observes/transforms a request before it reaches the transport.
///
/// Registered in the `outer` bucket (around the dispatch loop, best-effort)
/// or the `inner` bucket (inside the worker, full control flow).
#[async_trait]
pub trait RequestMiddleware: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError>;

    /// Used in log lines when a middleware fails.
    fn name(&self) -> &'static str {
        "<request middleware>"
    }
}

/// Observes a response before the callback runs.
#[async_trait]
pub trait ResponseMiddleware: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request,
        response: &Response,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError>;

    fn name(&self) -> &'static str {
        "<response middleware>"
    }
}

/// Observes a failed request before the errback runs. The retry middleware
/// is registered here.
#[async_trait]
pub trait ExceptionMiddleware: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request,
        error: &ScrapeError,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError>;

    fn name(&self) -> &'static str {
        "<exception middleware>"
    }
}

/// Per-request success handler.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn on_response(
        &self,
        request: &Request,
        response: &Response,
        cx: &EngineContext,
    ) -> Result<(), ScrapeError>;
}

/// Per-request failure handler.
#[async_trait]
pub trait Errback: Send + Sync {
    async fn on_error(
        &self,
        request: &Request,
        error: &ScrapeError,
        cx: &EngineContext,
    ) -> Result<(), ScrapeError>;
}

/// A user-supplied source of requests. Returning does not stop the engine;
/// in-flight work keeps draining.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, cx: EngineContext) -> Result<(), ScrapeError>;
}

struct FnRequestMiddleware<F>(F);

#[async_trait]
impl<F> RequestMiddleware for FnRequestMiddleware<F>
where
    F: Fn(&mut Request, &EngineContext) -> BoxFuture<'static, Result<Flow, ScrapeError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        request: &mut Request,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError> {
        (self.0)(request, cx).await
    }
}

/// Wraps a closure as a [`RequestMiddleware`].
pub fn request_middleware_fn<F>(f: F) -> Arc<dyn RequestMiddleware>
where
    F: Fn(&mut Request, &EngineContext) -> BoxFuture<'static, Result<Flow, ScrapeError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnRequestMiddleware(f))
}

struct FnResponseMiddleware<F>(F);

#[async_trait]
impl<F> ResponseMiddleware for FnResponseMiddleware<F>
where
    F: Fn(&mut Request, &Response, &EngineContext) -> BoxFuture<'static, Result<Flow, ScrapeError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        request: &mut Request,
        response: &Response,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError> {
        (self.0)(request, response, cx).await
    }
}

/// Wraps a closure as a [`ResponseMiddleware`].
pub fn response_middleware_fn<F>(f: F) -> Arc<dyn ResponseMiddleware>
where
    F: Fn(&mut Request, &Response, &EngineContext) -> BoxFuture<'static, Result<Flow, ScrapeError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnResponseMiddleware(f))
}

struct FnExceptionMiddleware<F>(F);

#[async_trait]
impl<F> ExceptionMiddleware for FnExceptionMiddleware<F>
where
    F: Fn(&mut Request, &ScrapeError, &EngineContext) -> BoxFuture<'static, Result<Flow, ScrapeError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        request: &mut Request,
        error: &ScrapeError,
        cx: &EngineContext,
    ) -> Result<Flow, ScrapeError> {
        (self.0)(request, error, cx).await
    }
}

/// Wraps a closure as an [`ExceptionMiddleware`].
pub fn exception_middleware_fn<F>(f: F) -> Arc<dyn ExceptionMiddleware>
where
    F: Fn(&mut Request, &ScrapeError, &EngineContext) -> BoxFuture<'static, Result<Flow, ScrapeError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnExceptionMiddleware(f))
}

struct FnCallback<F>(F);

#[async_trait]
impl<F> Callback for FnCallback<F>
where
    F: Fn(&Request, &Response, &EngineContext) -> BoxFuture<'static, Result<(), ScrapeError>>
        + Send
        + Sync,
{
    async fn on_response(
        &self,
        request: &Request,
        response: &Response,
        cx: &EngineContext,
    ) -> Result<(), ScrapeError> {
        (self.0)(request, response, cx).await
    }
}

/// Wraps a closure as a [`Callback`].
pub fn callback_fn<F>(f: F) -> Arc<dyn Callback>
where
    F: Fn(&Request, &Response, &EngineContext) -> BoxFuture<'static, Result<(), ScrapeError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnCallback(f))
}

struct FnErrback<F>(F);

#[async_trait]
impl<F> Errback for FnErrback<F>
where
    F: Fn(&Request, &ScrapeError, &EngineContext) -> BoxFuture<'static, Result<(), ScrapeError>>
        + Send
        + Sync,
{
    async fn on_error(
        &self,
        request: &Request,
        error: &ScrapeError,
        cx: &EngineContext,
    ) -> Result<(), ScrapeError> {
        (self.0)(request, error, cx).await
    }
}

/// Wraps a closure as an [`Errback`].
pub fn errback_fn<F>(f: F) -> Arc<dyn Errback>
where
    F: Fn(&Request, &ScrapeError, &EngineContext) -> BoxFuture<'static, Result<(), ScrapeError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnErrback(f))
}

struct FnProducer<F>(F);

#[async_trait]
impl<F> Producer for FnProducer<F>
where
    F: Fn(EngineContext) -> BoxFuture<'static, Result<(), ScrapeError>> + Send + Sync,
{
    async fn produce(&self, cx: EngineContext) -> Result<(), ScrapeError> {
        (self.0)(cx).await
    }
}

/// Wraps a closure as a [`Producer`].
pub fn producer_fn<F>(f: F) -> Arc<dyn Producer>
where
    F: Fn(EngineContext) -> BoxFuture<'static, Result<(), ScrapeError>> + Send + Sync + 'static,
{
    Arc::new(FnProducer(f))
}
