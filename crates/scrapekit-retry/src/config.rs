use crate::backoff::BackoffStrategy;
use scrapekit_core::{ErrorKind, DEFAULT_MIDDLEWARE_PRIORITY};
use std::time::Duration;

/// Configuration for the built-in retry middleware.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Maximum number of retries per request (not counting the first
    /// attempt).
    pub attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay: Duration,
    /// Cap for exponential strategies.
    pub max_delay: Duration,
    /// Response statuses that trigger a retry.
    pub statuses: Vec<u16>,
    /// Error kinds that trigger a retry.
    pub error_kinds: Vec<ErrorKind>,
    /// Registration priority in the exception stage.
    pub priority: i32,
    /// When set, a scheduled retry stops further processing of the failed
    /// request, so no errback runs for the attempt being retried.
    pub stop_processing: bool,
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryConfigBuilder {
    enabled: bool,
    attempts: u32,
    backoff: BackoffStrategy,
    base_delay: Duration,
    max_delay: Duration,
    statuses: Vec<u16>,
    error_kinds: Vec<ErrorKind>,
    priority: i32,
    stop_processing: bool,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - enabled: false
    /// - attempts: 3
    /// - backoff: constant, base_delay 100ms, max_delay 30s
    /// - statuses: 500, 502, 503, 504, 522, 524, 408, 429
    /// - error_kinds: timeout
    /// - priority: 100, stop_processing: true
    pub fn new() -> Self {
        Self {
            enabled: false,
            attempts: 3,
            backoff: BackoffStrategy::Constant,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            statuses: vec![500, 502, 503, 504, 522, 524, 408, 429],
            error_kinds: vec![ErrorKind::Timeout],
            priority: DEFAULT_MIDDLEWARE_PRIORITY,
            stop_processing: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn statuses(mut self, statuses: Vec<u16>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn error_kinds(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.error_kinds = kinds;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn stop_processing(mut self, stop: bool) -> Self {
        self.stop_processing = stop;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            enabled: self.enabled,
            attempts: self.attempts,
            backoff: self.backoff,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            statuses: self.statuses,
            error_kinds: self.error_kinds,
            priority: self.priority,
            stop_processing: self.stop_processing,
        }
    }
}
