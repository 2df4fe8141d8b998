use scrapekit_engine::{ExecutionConfig, SchedulerConfig, SessionConfig};
use scrapekit_ratelimit::RateLimitConfig;
use scrapekit_retry::RetryConfig;

/// Configuration for the item pipeline dispatcher.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fail dispatch when an item has no registered pipelines.
    pub strict: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// The complete engine configuration.
///
/// Build one programmatically from the section builders, or load it from
/// environment variables with [`crate::load_config`].
#[derive(Default)]
pub struct Config {
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub scheduler: SchedulerConfig,
    pub execution: ExecutionConfig,
    pub pipeline: PipelineConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_conservative() {
        let config = Config::default();
        assert!(!config.retry.enabled);
        assert!(!config.rate_limit.enabled);
        assert!(config.pipeline.strict);
        assert_eq!(config.scheduler.concurrent_requests, 64);
    }
}
