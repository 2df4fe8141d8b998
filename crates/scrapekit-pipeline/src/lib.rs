//! Item pipelines for the scrapekit engine.
//!
//! Callbacks hand scraped items to a [`PipelineDispatcher`], which routes
//! each item by its [`Item::pipeline_name`] through that name's ordered
//! pre-middlewares, pipelines, and post-middlewares. Global middlewares
//! wrap the whole dispatch as a chain of decorators, registered
//! innermost-first.
//!
//! # Example
//!
//! ```
//! use scrapekit_pipeline::{Item, PipelineDispatcher, pipeline_fn};
//!
//! #[derive(Debug, PartialEq)]
//! struct Listing {
//!     title: String,
//! }
//!
//! impl Item for Listing {
//!     fn pipeline_name(&self) -> &str {
//!         "listings"
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), scrapekit_core::ScrapeError> {
//! let dispatcher = PipelineDispatcher::builder()
//!     .add_pipeline("listings", pipeline_fn(|item: Listing| {
//!         Box::pin(async move { Ok(item) })
//!     }))
//!     .build();
//!
//! let item = dispatcher.put(Listing { title: "x".into() }).await?;
//! assert_eq!(item.title, "x");
//! # Ok(())
//! # }
//! ```

mod dispatcher;

pub use dispatcher::{
    item_middleware_fn, pipeline_fn, GlobalItemMiddleware, Item, ItemMiddleware, Next, Pipeline,
    PipelineDispatcher, PipelineDispatcherBuilder,
};
