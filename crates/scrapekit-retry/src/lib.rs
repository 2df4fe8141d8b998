//! Retry support for the scrapekit engine.
//!
//! [`RetryMiddleware`] is an exception-stage middleware: when a request
//! fails with a matching status or error kind, it re-submits the request
//! through the engine's sender with a scheduled delay, so the delayed heap
//! performs the wait instead of blocking a worker. The delay comes from a
//! server-sent `Retry-After` when present, otherwise from the configured
//! [`BackoffStrategy`].
//!
//! # Example
//!
//! ```
//! use scrapekit_retry::{BackoffStrategy, RetryConfig};
//! use std::time::Duration;
//!
//! let config = RetryConfig::builder()
//!     .enabled(true)
//!     .attempts(2)
//!     .backoff(BackoffStrategy::Exponential)
//!     .base_delay(Duration::from_millis(50))
//!     .statuses(vec![502])
//!     .build();
//! assert!(config.enabled);
//! ```

mod backoff;
mod config;
mod middleware;

pub use backoff::BackoffStrategy;
pub use config::{RetryConfig, RetryConfigBuilder};
pub use middleware::{RetryMiddleware, RETRY_ATTEMPTS_STATE_KEY};
