//! Routing items through name-keyed pipeline containers.

use async_trait::async_trait;
use futures::future::BoxFuture;
use scrapekit_core::{ItemFlow, ScrapeError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A scraped item. Dispatch is keyed on `pipeline_name`; an enum item type
/// routes its variants to different containers.
pub trait Item: Send + 'static {
    fn pipeline_name(&self) -> &str;
}

/// Placeholder item for engines that do not use pipelines.
impl Item for () {
    fn pipeline_name(&self) -> &str {
        ""
    }
}

/// One processing stage for an item.
#[async_trait]
pub trait Pipeline<I: Item>: Send + Sync {
    async fn put(&self, item: I) -> Result<I, ScrapeError>;

    /// Called once when the engine shuts down.
    async fn close(&self) -> Result<(), ScrapeError> {
        Ok(())
    }
}

/// Transforms an item before (pre) or after (post) its pipelines run.
#[async_trait]
pub trait ItemMiddleware<I: Item>: Send + Sync {
    async fn handle(&self, item: I) -> Result<ItemFlow<I>, ScrapeError>;
}

/// Wraps the entire dispatch of an item. `next.run(item)` invokes the rest
/// of the chain and finally the container processing.
#[async_trait]
pub trait GlobalItemMiddleware<I: Item>: Send + Sync {
    async fn handle(&self, item: I, next: Next<'_, I>) -> Result<I, ScrapeError>;
}

/// The remainder of the global middleware chain.
pub struct Next<'a, I: Item> {
    dispatcher: &'a PipelineDispatcher<I>,
    middlewares: &'a [Arc<dyn GlobalItemMiddleware<I>>],
}

impl<'a, I: Item> Next<'a, I> {
    /// Runs the remaining global middlewares, then the container chain.
    pub async fn run(self, item: I) -> Result<I, ScrapeError> {
        match self.middlewares.split_last() {
            Some((outer, rest)) => {
                outer
                    .handle(
                        item,
                        Next {
                            dispatcher: self.dispatcher,
                            middlewares: rest,
                        },
                    )
                    .await
            }
            None => self.dispatcher.process(item).await,
        }
    }
}

struct PipelineContainer<I: Item> {
    pre: Vec<Arc<dyn ItemMiddleware<I>>>,
    pipelines: Vec<Arc<dyn Pipeline<I>>>,
    post: Vec<Arc<dyn ItemMiddleware<I>>>,
}

impl<I: Item> Default for PipelineContainer<I> {
    fn default() -> Self {
        Self {
            pre: Vec::new(),
            pipelines: Vec::new(),
            post: Vec::new(),
        }
    }
}

/// Routes items to their containers and manages pipeline shutdown.
pub struct PipelineDispatcher<I: Item> {
    strict: bool,
    containers: HashMap<String, PipelineContainer<I>>,
    /// Container registration order, for deterministic close.
    order: Vec<String>,
    globals: Vec<Arc<dyn GlobalItemMiddleware<I>>>,
    closed: AtomicBool,
}

impl<I: Item> PipelineDispatcher<I> {
    pub fn builder() -> PipelineDispatcherBuilder<I> {
        PipelineDispatcherBuilder::new()
    }

    /// Dispatches one item through the global chain and its container.
    pub async fn put(&self, item: I) -> Result<I, ScrapeError> {
        tracing::debug!(pipeline = item.pipeline_name(), "pipeline item received");
        Next {
            dispatcher: self,
            middlewares: &self.globals,
        }
        .run(item)
        .await
    }

    async fn process(&self, mut item: I) -> Result<I, ScrapeError> {
        let Some(container) = self.containers.get(item.pipeline_name()) else {
            if self.strict {
                return Err(ScrapeError::Pipeline(format!(
                    "no pipelines registered for item {:?}",
                    item.pipeline_name()
                )));
            }
            tracing::warn!(
                pipeline = item.pipeline_name(),
                "no pipelines registered for item"
            );
            return Ok(item);
        };

        for middleware in &container.pre {
            match middleware.handle(item).await? {
                ItemFlow::Continue(next) => item = next,
                ItemFlow::StopChain(next) => {
                    item = next;
                    break;
                }
                ItemFlow::StopItem(next) => return Ok(next),
            }
        }

        for pipeline in &container.pipelines {
            item = pipeline.put(item).await?;
        }

        for middleware in &container.post {
            match middleware.handle(item).await? {
                ItemFlow::Continue(next) => item = next,
                ItemFlow::StopChain(next) => {
                    item = next;
                    break;
                }
                ItemFlow::StopItem(next) => return Ok(next),
            }
        }

        Ok(item)
    }

    /// Closes all pipelines in registration order. A second close is a
    /// no-op; close failures are logged and do not stop the remaining
    /// pipelines from closing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for name in &self.order {
            let Some(container) = self.containers.get(name) else {
                continue;
            };
            for pipeline in &container.pipelines {
                if let Err(error) = pipeline.close().await {
                    tracing::error!(pipeline = %name, %error, "pipeline close failed");
                }
            }
        }
    }
}

/// Builder for [`PipelineDispatcher`].
pub struct PipelineDispatcherBuilder<I: Item> {
    strict: bool,
    containers: HashMap<String, PipelineContainer<I>>,
    order: Vec<String>,
    globals: Vec<Arc<dyn GlobalItemMiddleware<I>>>,
}

impl<I: Item> Default for PipelineDispatcherBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Item> PipelineDispatcherBuilder<I> {
    pub fn new() -> Self {
        Self {
            strict: true,
            containers: HashMap::new(),
            order: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// Whether a missing container fails dispatch (default) or passes the
    /// item through with a warning.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn add_pipeline(mut self, name: impl Into<String>, pipeline: Arc<dyn Pipeline<I>>) -> Self {
        self.container(name.into()).pipelines.push(pipeline);
        self
    }

    pub fn add_pre_middleware(
        mut self,
        name: impl Into<String>,
        middleware: Arc<dyn ItemMiddleware<I>>,
    ) -> Self {
        self.container(name.into()).pre.push(middleware);
        self
    }

    pub fn add_post_middleware(
        mut self,
        name: impl Into<String>,
        middleware: Arc<dyn ItemMiddleware<I>>,
    ) -> Self {
        self.container(name.into()).post.push(middleware);
        self
    }

    /// Adds a global middleware. The first registered runs closest to the
    /// container processing; later registrations wrap earlier ones.
    pub fn add_global_middleware(mut self, middleware: Arc<dyn GlobalItemMiddleware<I>>) -> Self {
        self.globals.push(middleware);
        self
    }

    fn container(&mut self, name: String) -> &mut PipelineContainer<I> {
        if !self.containers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.containers.entry(name).or_default()
    }

    pub fn build(self) -> PipelineDispatcher<I> {
        PipelineDispatcher {
            strict: self.strict,
            containers: self.containers,
            order: self.order,
            globals: self.globals,
            closed: AtomicBool::new(false),
        }
    }
}

struct FnPipeline<F>(F);

#[async_trait]
impl<I, F> Pipeline<I> for FnPipeline<F>
where
    I: Item,
    F: Fn(I) -> BoxFuture<'static, Result<I, ScrapeError>> + Send + Sync,
{
    async fn put(&self, item: I) -> Result<I, ScrapeError> {
        (self.0)(item).await
    }
}

/// Wraps an async closure as a [`Pipeline`].
pub fn pipeline_fn<I, F>(f: F) -> Arc<dyn Pipeline<I>>
where
    I: Item,
    F: Fn(I) -> BoxFuture<'static, Result<I, ScrapeError>> + Send + Sync + 'static,
{
    Arc::new(FnPipeline(f))
}

struct FnItemMiddleware<F>(F);

#[async_trait]
impl<I, F> ItemMiddleware<I> for FnItemMiddleware<F>
where
    I: Item,
    F: Fn(I) -> BoxFuture<'static, Result<ItemFlow<I>, ScrapeError>> + Send + Sync,
{
    async fn handle(&self, item: I) -> Result<ItemFlow<I>, ScrapeError> {
        (self.0)(item).await
    }
}

/// Wraps an async closure as an [`ItemMiddleware`].
pub fn item_middleware_fn<I, F>(f: F) -> Arc<dyn ItemMiddleware<I>>
where
    I: Item,
    F: Fn(I) -> BoxFuture<'static, Result<ItemFlow<I>, ScrapeError>> + Send + Sync + 'static,
{
    Arc::new(FnItemMiddleware(f))
}
