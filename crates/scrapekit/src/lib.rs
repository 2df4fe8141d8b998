//! scrapekit: a concurrent HTTP fetching engine.
//!
//! Producers enqueue prioritised requests; the engine dispatches them
//! under bounded concurrency, per-group rate limiting (optionally
//! adaptive), retries with typed backoff, and a middleware chain around
//! each request, with cooperative signal-driven shutdown.
//!
//! This crate is the assembly point: [`Scraper`] wires producers,
//! middlewares, pipelines, and configuration into the engine and runs it.
//!
//! # Example
//!
//! ```no_run
//! use scrapekit::{producer_fn, Request, Scraper};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), scrapekit::ScrapeError> {
//!     let mut scraper: Scraper = Scraper::new();
//!     scraper.add_producer(producer_fn(|cx| {
//!         Box::pin(async move {
//!             cx.send(Request::get("https://example.com").build()?).await
//!         })
//!     }));
//!     scraper.run().await
//! }
//! ```
//!
//! Configuration comes from [`Config`] or, by default, from environment
//! variables (`SESSION_*`, `SCHEDULER_*`, `EXECUTION_*`, `PIPELINE_*`)
//! via [`load_config`].

mod config;
mod env;
mod runner;
mod scraper;

pub use config::{Config, PipelineConfig};
pub use env::load_config;
pub use runner::{run, run_with_shutdown};
pub use scraper::Scraper;

pub use scrapekit_core::{
    callback_fn, errback_fn, exception_middleware_fn, producer_fn, request_middleware_fn,
    response_middleware_fn, BasicAuth, Body, Callback, Cookie, EngineContext, Errback, ErrorKind,
    ExceptionMiddleware, FilePart, Flow, ItemFlow, MiddlewareRegistry, Producer, Request,
    RequestBuilder, RequestMiddleware, Response, ResponseMiddleware, ScrapeError, SendRequest,
    Stage, StateMap, DEFAULT_MIDDLEWARE_PRIORITY,
};
pub use scrapekit_engine::{
    build_session, ExecutionConfig, HttpBackend, ProxyConfig, ReqwestSession, SchedulerConfig,
    Session, SessionConfig, SslMode,
};
pub use scrapekit_pipeline::{
    item_middleware_fn, pipeline_fn, GlobalItemMiddleware, Item, ItemMiddleware, Next, Pipeline,
    PipelineDispatcher,
};
pub use scrapekit_ratelimit::{
    AdaptiveConfig, GroupMetrics, RateLimitConfig, RequestOutcome, MIN_GROUP_INTERVAL,
};
pub use scrapekit_retry::{BackoffStrategy, RetryConfig, RetryMiddleware};

pub use tokio_util::sync::CancellationToken;
