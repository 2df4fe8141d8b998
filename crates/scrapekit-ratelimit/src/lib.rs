//! Per-group rate limiting for the scrapekit engine.
//!
//! Requests are grouped by a configurable key (default: URL host) and each
//! group hands requests to the worker pool serially, sleeping the group's
//! interval between hand-offs. Groups are created on demand and clean
//! themselves up after a period of inactivity.
//!
//! With an [`AdaptiveConfig`] attached, the limiter also adjusts each
//! group's interval from observed outcomes: multiplicative increase on
//! failure triggers, additive decrease after a streak of successes, and an
//! optional `Retry-After` override — AIMD inverted for inter-request
//! spacing, with EWMA-smoothed latency tracking.
//!
//! # Example
//!
//! ```
//! use scrapekit_ratelimit::RateLimitConfig;
//! use std::time::Duration;
//!
//! let config = RateLimitConfig::builder()
//!     .enabled(true)
//!     .default_interval(Duration::from_millis(500))
//!     .cleanup_timeout(Duration::from_secs(10))
//!     .build();
//! assert!(config.enabled);
//! ```

mod adaptive;
mod config;
mod limiter;

pub use adaptive::{AdaptiveConfig, AdaptiveConfigBuilder, GroupMetrics, RequestOutcome};
pub use config::{GroupBy, RateLimitConfig, RateLimitConfigBuilder};
pub use limiter::{DispatchRequest, RateLimiter, MIN_GROUP_INTERVAL};
