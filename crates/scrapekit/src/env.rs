//! Environment-variable configuration loading.

use crate::config::{Config, PipelineConfig};
use scrapekit_core::{ErrorKind, ScrapeError};
use scrapekit_engine::{
    ExecutionConfig, HttpBackend, ProxyConfig, SchedulerConfig, SessionConfig, SslMode,
};
use scrapekit_ratelimit::{AdaptiveConfig, RateLimitConfig};
use scrapekit_retry::{BackoffStrategy, RetryConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn to_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "on" | "ok" | "y" | "yes" | "1"
    )
}

fn parse_bool(key: &str, default: bool) -> bool {
    var(key).map(|v| to_bool(&v)).unwrap_or(default)
}

fn parse_parsed<T: FromStr>(key: &str, default: T) -> Result<T, ScrapeError>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| {
            ScrapeError::Config(format!("failed to parse {key}={raw:?}: {e}"))
        }),
        None => Ok(default),
    }
}

fn parse_secs(key: &str, default: Duration) -> Result<Duration, ScrapeError> {
    let seconds = parse_parsed::<f64>(key, default.as_secs_f64())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ScrapeError::Config(format!(
            "{key} must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn parse_opt_secs(key: &str) -> Result<Option<Duration>, ScrapeError> {
    match var(key) {
        Some(_) => Ok(Some(parse_secs(key, Duration::ZERO)?)),
        None => Ok(None),
    }
}

fn parse_csv<T: FromStr>(key: &str, default: Vec<T>) -> Result<Vec<T>, ScrapeError>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = var(key) else {
        return Ok(default);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>().map_err(|e| {
                ScrapeError::Config(format!("failed to parse item {item:?} in {key}: {e}"))
            })
        })
        .collect()
}

fn parse_log_level(key: &str, default: tracing::Level) -> Result<tracing::Level, ScrapeError> {
    match var(key) {
        Some(raw) => raw.parse::<tracing::Level>().map_err(|_| {
            ScrapeError::Config(format!("failed to parse {key}={raw:?} as a log level"))
        }),
        None => Ok(default),
    }
}

fn parse_ssl(key: &str) -> SslMode {
    match var(key) {
        None => SslMode::Verify,
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" => SslMode::Verify,
            "false" => SslMode::NoVerify,
            _ => SslMode::CaBundle(PathBuf::from(raw)),
        },
    }
}

/// `SESSION_PROXY` accepts either a proxy URL or a JSON object with
/// `http`/`https` keys (scheme keys are canonical without `://`).
fn parse_proxy(key: &str) -> Result<Option<ProxyConfig>, ScrapeError> {
    let Some(raw) = var(key) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }

    if raw.trim_start().starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| ScrapeError::Config(format!("failed to parse {key} as JSON: {e}")))?;
        let pick = |scheme: &str| {
            value
                .get(scheme)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        return Ok(Some(ProxyConfig::PerScheme {
            http: pick("http"),
            https: pick("https"),
        }));
    }

    Ok(Some(ProxyConfig::Url(raw)))
}

/// Loads the complete configuration from environment variables, falling
/// back to defaults for anything unset.
pub fn load_config() -> Result<Config, ScrapeError> {
    let retry_defaults = RetryConfig::default();
    let retry = RetryConfig::builder()
        .enabled(parse_bool("SESSION_RETRY_ENABLED", retry_defaults.enabled))
        .attempts(parse_parsed("SESSION_RETRY_ATTEMPTS", retry_defaults.attempts)?)
        .backoff(parse_parsed::<BackoffStrategy>(
            "SESSION_RETRY_BACKOFF",
            retry_defaults.backoff,
        )?)
        .base_delay(parse_secs(
            "SESSION_RETRY_BASE_DELAY",
            retry_defaults.base_delay,
        )?)
        .max_delay(parse_secs("SESSION_RETRY_MAX_DELAY", retry_defaults.max_delay)?)
        .statuses(parse_csv("SESSION_RETRY_STATUSES", retry_defaults.statuses)?)
        .error_kinds(parse_csv::<ErrorKind>(
            "SESSION_RETRY_EXCEPTIONS",
            retry_defaults.error_kinds,
        )?)
        .priority(parse_parsed(
            "SESSION_RETRY_MIDDLEWARE_PRIORITY",
            retry_defaults.priority,
        )?)
        .stop_processing(parse_bool(
            "SESSION_RETRY_MIDDLEWARE_STOP",
            retry_defaults.stop_processing,
        ))
        .build();

    let adaptive = if parse_bool("SESSION_RATE_LIMIT_ADAPTIVE_ENABLED", false) {
        let defaults = AdaptiveConfig::default();
        let adaptive = AdaptiveConfig::builder()
            .min_interval(parse_secs(
                "SESSION_RATE_LIMIT_ADAPTIVE_MIN_INTERVAL",
                defaults.min_interval,
            )?)
            .max_interval(parse_secs(
                "SESSION_RATE_LIMIT_ADAPTIVE_MAX_INTERVAL",
                defaults.max_interval,
            )?)
            .increase_factor(parse_parsed(
                "SESSION_RATE_LIMIT_ADAPTIVE_INCREASE_FACTOR",
                defaults.increase_factor,
            )?)
            .decrease_step(parse_secs(
                "SESSION_RATE_LIMIT_ADAPTIVE_DECREASE_STEP",
                defaults.decrease_step,
            )?)
            .success_threshold(parse_parsed(
                "SESSION_RATE_LIMIT_ADAPTIVE_SUCCESS_THRESHOLD",
                defaults.success_threshold,
            )?)
            .ewma_alpha(parse_parsed(
                "SESSION_RATE_LIMIT_ADAPTIVE_EWMA_ALPHA",
                defaults.ewma_alpha,
            )?)
            .respect_retry_after(parse_bool(
                "SESSION_RATE_LIMIT_ADAPTIVE_RESPECT_RETRY_AFTER",
                defaults.respect_retry_after,
            ))
            .inherit_retry_triggers(parse_bool(
                "SESSION_RATE_LIMIT_ADAPTIVE_INHERIT_RETRY_TRIGGERS",
                defaults.inherit_retry_triggers,
            ))
            .build();
        adaptive.validate()?;
        Some(adaptive)
    } else {
        None
    };

    let mut rate_limit = RateLimitConfig::builder()
        .enabled(parse_bool("SESSION_RATE_LIMIT_ENABLED", false))
        .default_interval(parse_secs("SESSION_RATE_LIMIT_INTERVAL", Duration::ZERO)?)
        .cleanup_timeout(parse_secs(
            "SESSION_RATE_LIMIT_CLEANUP_TIMEOUT",
            Duration::from_secs(10),
        )?);
    if let Some(adaptive) = adaptive {
        rate_limit = rate_limit.adaptive(adaptive);
    }

    let session_defaults = SessionConfig::default();
    let session = SessionConfig::builder()
        .timeout(parse_secs("SESSION_REQUEST_TIMEOUT", session_defaults.timeout)?)
        .ssl(parse_ssl("SESSION_SSL"))
        .proxy(parse_proxy("SESSION_PROXY")?)
        .backend(parse_parsed::<HttpBackend>(
            "SESSION_HTTP_BACKEND",
            session_defaults.backend,
        )?)
        .build();

    let scheduler_defaults = SchedulerConfig::default();
    let scheduler = SchedulerConfig::builder()
        .concurrent_requests(parse_parsed(
            "SCHEDULER_CONCURRENT_REQUESTS",
            scheduler_defaults.concurrent_requests,
        )?)
        .pending_requests(parse_parsed(
            "SCHEDULER_PENDING_REQUESTS",
            scheduler_defaults.pending_requests,
        )?)
        .close_timeout(parse_secs(
            "SCHEDULER_CLOSE_TIMEOUT",
            scheduler_defaults.close_timeout,
        )?)
        .ready_queue_max_size(parse_parsed(
            "SCHEDULER_READY_QUEUE_MAX_SIZE",
            scheduler_defaults.ready_queue_max_size,
        )?)
        .build();

    let execution_defaults = ExecutionConfig::default();
    let execution = ExecutionConfig::builder()
        .timeout(parse_opt_secs("EXECUTION_TIMEOUT")?)
        .shutdown_timeout(parse_secs(
            "EXECUTION_SHUTDOWN_TIMEOUT",
            execution_defaults.shutdown_timeout,
        )?)
        .shutdown_check_interval(parse_secs(
            "EXECUTION_SHUTDOWN_CHECK_INTERVAL",
            execution_defaults.shutdown_check_interval,
        )?)
        .log_level(parse_log_level(
            "EXECUTION_LOG_LEVEL",
            execution_defaults.log_level,
        )?)
        .build();

    Ok(Config {
        session,
        retry,
        rate_limit: rate_limit.build(),
        scheduler,
        execution,
        pipeline: PipelineConfig {
            strict: parse_bool("PIPELINE_STRICT", true),
        },
    })
}
