//! Core types for the scrapekit fetching engine.
//!
//! This crate defines the vocabulary shared by every other scrapekit crate:
//!
//! - [`Request`] / [`Response`]: the carrier types moved through the engine,
//!   built with [`RequestBuilder`] and validated on construction.
//! - [`ScrapeError`]: the unified error taxonomy, with [`ErrorKind`] for
//!   trigger matching in retry and adaptive rate-limit policies.
//! - [`Flow`] / [`ItemFlow`]: middleware control-flow values. Stopping a
//!   chain is not an error, so it is expressed as a return value rather
//!   than an error variant.
//! - Handler traits ([`RequestMiddleware`], [`ResponseMiddleware`],
//!   [`ExceptionMiddleware`], [`Callback`], [`Errback`], [`Producer`])
//!   and the [`EngineContext`] passed to all of them.
//! - [`MiddlewareRegistry`]: the priority-ordered buckets the engine walks
//!   around each request.
//!
//! # Example
//!
//! ```
//! use scrapekit_core::{Request, ScrapeError};
//!
//! # fn main() -> Result<(), ScrapeError> {
//! let request = Request::get("https://example.com/items")
//!     .param("page", "1")
//!     .priority(5)
//!     .build()?;
//! assert_eq!(request.method, http::Method::GET);
//! # Ok(())
//! # }
//! ```

mod context;
mod control;
mod envelope;
mod error;
mod handler;
pub mod headers;
mod registry;
mod request;
mod response;
mod state;

pub use context::EngineContext;
pub use control::{Flow, ItemFlow};
pub use envelope::{DelayedEnvelope, Envelope};
pub use error::{ErrorKind, ScrapeError};
pub use handler::{
    callback_fn, errback_fn, exception_middleware_fn, producer_fn, request_middleware_fn,
    response_middleware_fn, Callback, Errback, ExceptionMiddleware, Producer, RequestMiddleware,
    ResponseMiddleware, SendRequest,
};
pub use registry::{MiddlewareRegistry, Stage, DEFAULT_MIDDLEWARE_PRIORITY};
pub use request::{BasicAuth, Body, FilePart, Request, RequestBuilder};
pub use response::{Cookie, Response};
pub use state::StateMap;
