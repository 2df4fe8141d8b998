//! Delay computation between retry attempts.

use rand::Rng;
use scrapekit_core::ScrapeError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the delay before attempt `n` is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Always `base_delay`.
    Constant,
    /// `base_delay * attempt`.
    Linear,
    /// `min(max_delay, base_delay * 2^attempt)`.
    Exponential,
    /// The exponential delay, jittered into `[delay/2, delay]`.
    ExponentialJitter,
}

impl BackoffStrategy {
    /// Computes the delay before retry attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
        match self {
            BackoffStrategy::Constant => base_delay,
            BackoffStrategy::Linear => {
                Duration::from_secs_f64(base_delay.as_secs_f64() * f64::from(attempt))
            }
            BackoffStrategy::Exponential => exponential(attempt, base_delay, max_delay),
            BackoffStrategy::ExponentialJitter => {
                let delay = exponential(attempt, base_delay, max_delay).as_secs_f64();
                let half = delay / 2.0;
                let jittered = half + rand::rng().random_range(0.0..=half);
                Duration::from_secs_f64(jittered.min(max_delay.as_secs_f64()))
            }
        }
    }
}

fn exponential(attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let scaled = base_delay.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
    Duration::from_secs_f64(scaled.min(max_delay.as_secs_f64()))
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Constant => f.write_str("CONSTANT"),
            BackoffStrategy::Linear => f.write_str("LINEAR"),
            BackoffStrategy::Exponential => f.write_str("EXPONENTIAL"),
            BackoffStrategy::ExponentialJitter => f.write_str("EXPONENTIAL_JITTER"),
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONSTANT" => Ok(BackoffStrategy::Constant),
            "LINEAR" => Ok(BackoffStrategy::Linear),
            "EXPONENTIAL" => Ok(BackoffStrategy::Exponential),
            "EXPONENTIAL_JITTER" => Ok(BackoffStrategy::ExponentialJitter),
            other => Err(ScrapeError::Config(format!(
                "unknown backoff strategy: {other:?}"
            ))),
        }
    }
}
