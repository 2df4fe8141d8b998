use crate::adaptive::AdaptiveConfig;
use scrapekit_core::Request;
use std::sync::Arc;
use std::time::Duration;

/// Maps a request to its rate-limit group key and interval.
pub type GroupBy = Arc<dyn Fn(&Request) -> (String, Duration) + Send + Sync>;

/// Configuration for the rate limiter.
pub struct RateLimitConfig {
    /// Whether grouping is active. When disabled, requests dispatch
    /// immediately, but a positive `default_interval` still throttles the
    /// dispatch loop globally (preserved from the original behaviour).
    pub enabled: bool,
    /// Interval between dispatches within a group (or globally when
    /// disabled).
    pub default_interval: Duration,
    /// How long an idle group lingers before its worker exits. The
    /// effective timeout is never below twice the group interval.
    pub cleanup_timeout: Duration,
    /// Custom grouping; defaults to the request URL's host with
    /// `default_interval`.
    pub group_by: Option<GroupBy>,
    /// Adaptive interval control; `None` keeps intervals fixed.
    pub adaptive: Option<AdaptiveConfig>,
}

impl RateLimitConfig {
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`RateLimitConfig`].
pub struct RateLimitConfigBuilder {
    enabled: bool,
    default_interval: Duration,
    cleanup_timeout: Duration,
    group_by: Option<GroupBy>,
    adaptive: Option<AdaptiveConfig>,
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - enabled: false
    /// - default_interval: 0
    /// - cleanup_timeout: 10 seconds
    /// - group_by: by URL host
    /// - adaptive: disabled
    pub fn new() -> Self {
        Self {
            enabled: false,
            default_interval: Duration::ZERO,
            cleanup_timeout: Duration::from_secs(10),
            group_by: None,
            adaptive: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    /// Sets a custom grouping function returning `(key, interval)` per
    /// request. Intervals at or below zero are clamped to
    /// [`crate::MIN_GROUP_INTERVAL`] when the group is created.
    pub fn group_by<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> (String, Duration) + Send + Sync + 'static,
    {
        self.group_by = Some(Arc::new(f));
        self
    }

    pub fn adaptive(mut self, adaptive: AdaptiveConfig) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    pub fn build(self) -> RateLimitConfig {
        RateLimitConfig {
            enabled: self.enabled,
            default_interval: self.default_interval,
            cleanup_timeout: self.cleanup_timeout,
            group_by: self.group_by,
            adaptive: self.adaptive,
        }
    }
}
