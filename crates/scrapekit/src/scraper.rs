//! The assembly point wiring producers, middlewares, and pipelines into
//! the engine.

use crate::config::Config;
use crate::env::load_config;
use http::Extensions;
use scrapekit_core::{
    ExceptionMiddleware, MiddlewareRegistry, Producer, RequestMiddleware, ResponseMiddleware,
    ScrapeError,
};
use scrapekit_engine::{build_session, Executor, ExecutionConfig, Session};
use scrapekit_pipeline::{
    GlobalItemMiddleware, Item, ItemMiddleware, Pipeline, PipelineDispatcher,
    PipelineDispatcherBuilder,
};
use scrapekit_retry::RetryMiddleware;
use std::mem;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wires scrapers, middlewares, and pipelines, then runs the engine.
///
/// The item type parameter is the type handed to pipelines; engines
/// without pipelines use the default `()`.
///
/// ```no_run
/// use scrapekit::{producer_fn, Request, Scraper};
///
/// # async fn example() -> Result<(), scrapekit::ScrapeError> {
/// let mut scraper: Scraper = Scraper::new();
/// scraper.add_producer(producer_fn(|cx| {
///     Box::pin(async move {
///         cx.send(Request::get("https://example.com").build()?).await
///     })
/// }));
/// scraper.run().await
/// # }
/// ```
pub struct Scraper<I: Item = ()> {
    config: Option<Config>,
    session: Option<Arc<dyn Session>>,
    producers: Vec<Arc<dyn Producer>>,
    registry: MiddlewareRegistry,
    pipelines: PipelineDispatcherBuilder<I>,
    deps: Extensions,
}

impl<I: Item> Default for Scraper<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Item> Scraper<I> {
    pub fn new() -> Self {
        Self {
            config: None,
            session: None,
            producers: Vec::new(),
            registry: MiddlewareRegistry::new(),
            pipelines: PipelineDispatcherBuilder::new(),
            deps: Extensions::new(),
        }
    }

    /// Uses a pre-built configuration instead of loading the environment.
    pub fn with_config(&mut self, config: Config) -> &mut Self {
        self.config = Some(config);
        self
    }

    /// Overrides the transport (custom backends, tests).
    pub fn with_session(&mut self, session: Arc<dyn Session>) -> &mut Self {
        self.session = Some(session);
        self
    }

    pub fn add_producer(&mut self, producer: Arc<dyn Producer>) -> &mut Self {
        self.producers.push(producer);
        self
    }

    /// Registers a shared dependency handlers can read from the context by
    /// type.
    pub fn add_dependency<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.deps.insert(value);
        self
    }

    pub fn add_outer_middleware(
        &mut self,
        priority: i32,
        middleware: Arc<dyn RequestMiddleware>,
    ) -> &mut Self {
        self.registry.add_outer(priority, middleware);
        self
    }

    pub fn add_inner_middleware(
        &mut self,
        priority: i32,
        middleware: Arc<dyn RequestMiddleware>,
    ) -> &mut Self {
        self.registry.add_inner(priority, middleware);
        self
    }

    pub fn add_response_middleware(
        &mut self,
        priority: i32,
        middleware: Arc<dyn ResponseMiddleware>,
    ) -> &mut Self {
        self.registry.add_response(priority, middleware);
        self
    }

    pub fn add_exception_middleware(
        &mut self,
        priority: i32,
        middleware: Arc<dyn ExceptionMiddleware>,
    ) -> &mut Self {
        self.registry.add_exception(priority, middleware);
        self
    }

    pub fn add_pipeline(
        &mut self,
        name: impl Into<String>,
        pipeline: Arc<dyn Pipeline<I>>,
    ) -> &mut Self {
        self.pipelines = mem::take(&mut self.pipelines).add_pipeline(name, pipeline);
        self
    }

    pub fn add_pre_pipeline_middleware(
        &mut self,
        name: impl Into<String>,
        middleware: Arc<dyn ItemMiddleware<I>>,
    ) -> &mut Self {
        self.pipelines = mem::take(&mut self.pipelines).add_pre_middleware(name, middleware);
        self
    }

    pub fn add_post_pipeline_middleware(
        &mut self,
        name: impl Into<String>,
        middleware: Arc<dyn ItemMiddleware<I>>,
    ) -> &mut Self {
        self.pipelines = mem::take(&mut self.pipelines).add_post_middleware(name, middleware);
        self
    }

    pub fn add_global_pipeline_middleware(
        &mut self,
        middleware: Arc<dyn GlobalItemMiddleware<I>>,
    ) -> &mut Self {
        self.pipelines = mem::take(&mut self.pipelines).add_global_middleware(middleware);
        self
    }

    /// Runs the engine with SIGINT/SIGTERM handling until all producers
    /// finish and the queues drain (or a signal/timeout intervenes).
    pub async fn run(self) -> Result<(), ScrapeError> {
        crate::runner::run(self).await
    }

    /// Like [`Scraper::run`], but driven by caller-owned shutdown and
    /// force-exit tokens instead of process signals.
    pub async fn run_with_shutdown(
        self,
        shutdown: CancellationToken,
        force_exit: CancellationToken,
    ) -> Result<(), ScrapeError> {
        crate::runner::run_with_shutdown(self, shutdown, force_exit).await
    }

    pub(crate) fn ensure_config(&mut self) -> Result<(), ScrapeError> {
        if self.config.is_none() {
            self.config = Some(load_config()?);
        }
        Ok(())
    }

    pub(crate) fn execution_config(&self) -> ExecutionConfig {
        self.config
            .as_ref()
            .map(|c| c.execution.clone())
            .unwrap_or_default()
    }

    /// Builds the engine and drives it to completion. The shutdown token
    /// abandons producers and drain waits; the orderly close always runs.
    pub(crate) async fn start(mut self, shutdown: CancellationToken) -> Result<(), ScrapeError> {
        self.ensure_config()?;
        let Some(config) = self.config.take() else {
            return Err(ScrapeError::Config("configuration missing".into()));
        };
        let Config {
            session: session_config,
            retry,
            mut rate_limit,
            scheduler,
            execution,
            pipeline,
        } = config;

        if let Some(adaptive) = rate_limit.adaptive.as_mut() {
            if adaptive.inherit_retry_triggers {
                adaptive.trigger_statuses = retry.statuses.clone();
                adaptive.trigger_kinds = retry.error_kinds.clone();
            }
            adaptive.validate()?;
        }

        let mut registry = self.registry;
        let retry_priority = retry.priority;
        registry.add_exception(retry_priority, Arc::new(RetryMiddleware::new(retry)));

        let session = match self.session.take() {
            Some(session) => session,
            None => build_session(&session_config)?,
        };

        let dispatcher: Arc<PipelineDispatcher<I>> =
            Arc::new(mem::take(&mut self.pipelines).strict(pipeline.strict).build());
        let mut deps = mem::take(&mut self.deps);
        deps.insert(Arc::clone(&dispatcher));

        let executor = Executor::new(
            &scheduler,
            &execution,
            rate_limit,
            session,
            Arc::new(registry),
            Arc::new(deps),
            mem::take(&mut self.producers),
            shutdown,
        );

        let result = executor.run().await;
        executor.close().await;
        // Pipelines close last: nothing can dispatch items any more.
        dispatcher.close().await;
        result
    }
}
