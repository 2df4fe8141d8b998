use std::time::Duration;

/// Configuration for the request scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of requests in flight.
    pub concurrent_requests: usize,
    /// Requests that may queue for a worker slot before the dispatcher
    /// blocks.
    pub pending_requests: usize,
    /// Drain deadline when closing the worker pool; stragglers are
    /// cancelled after it expires.
    pub close_timeout: Duration,
    /// Bound of the ready queue; 0 means unbounded.
    pub ready_queue_max_size: usize,
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerConfigBuilder {
    concurrent_requests: usize,
    pending_requests: usize,
    close_timeout: Duration,
    ready_queue_max_size: usize,
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - concurrent_requests: 64
    /// - pending_requests: 1
    /// - close_timeout: 100ms
    /// - ready_queue_max_size: 0 (unbounded)
    pub fn new() -> Self {
        Self {
            concurrent_requests: 64,
            pending_requests: 1,
            close_timeout: Duration::from_millis(100),
            ready_queue_max_size: 0,
        }
    }

    pub fn concurrent_requests(mut self, concurrent: usize) -> Self {
        self.concurrent_requests = concurrent;
        self
    }

    pub fn pending_requests(mut self, pending: usize) -> Self {
        self.pending_requests = pending;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn ready_queue_max_size(mut self, max_size: usize) -> Self {
        self.ready_queue_max_size = max_size;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            concurrent_requests: self.concurrent_requests,
            pending_requests: self.pending_requests,
            close_timeout: self.close_timeout,
            ready_queue_max_size: self.ready_queue_max_size,
        }
    }
}

/// Configuration for overall execution and shutdown.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Overall run deadline; `None` runs until drained or signalled.
    pub timeout: Option<Duration>,
    /// How long a cooperative shutdown waits for in-flight work.
    pub shutdown_timeout: Duration,
    /// Poll interval for drain checks; also the dispatch loop's wait slice
    /// when the delayed heap is empty.
    pub shutdown_check_interval: Duration,
    /// Level at which an execution timeout is logged.
    pub log_level: tracing::Level,
}

impl ExecutionConfig {
    pub fn builder() -> ExecutionConfigBuilder {
        ExecutionConfigBuilder::new()
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ExecutionConfig`].
#[derive(Debug, Clone)]
pub struct ExecutionConfigBuilder {
    timeout: Option<Duration>,
    shutdown_timeout: Duration,
    shutdown_check_interval: Duration,
    log_level: tracing::Level,
}

impl Default for ExecutionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - timeout: none
    /// - shutdown_timeout: 100ms
    /// - shutdown_check_interval: 50ms
    /// - log_level: ERROR
    pub fn new() -> Self {
        Self {
            timeout: None,
            shutdown_timeout: Duration::from_millis(100),
            shutdown_check_interval: Duration::from_millis(50),
            log_level: tracing::Level::ERROR,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn shutdown_check_interval(mut self, interval: Duration) -> Self {
        self.shutdown_check_interval = interval;
        self
    }

    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn build(self) -> ExecutionConfig {
        ExecutionConfig {
            timeout: self.timeout,
            shutdown_timeout: self.shutdown_timeout,
            shutdown_check_interval: self.shutdown_check_interval,
            log_level: self.log_level,
        }
    }
}
