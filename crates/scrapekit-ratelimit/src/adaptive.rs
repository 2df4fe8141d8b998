//! Adaptive interval control: multiplicative increase on failure,
//! additive decrease on sustained success, clamped to a configured range.

use http::StatusCode;
use scrapekit_core::{ErrorKind, ScrapeError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// The observed outcome of one completed request, reported to the limiter
/// so the adaptive strategy can pick the group's next interval.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub group_key: String,
    pub latency: Duration,
    /// Parsed `Retry-After`, when the server sent one.
    pub retry_after: Option<Duration>,
    /// Response status, when the transport produced a response.
    pub status: Option<StatusCode>,
    /// Error classification, when the request failed without a usable
    /// response.
    pub error_kind: Option<ErrorKind>,
}

/// Per-group running metrics.
#[derive(Debug, Clone, Default)]
pub struct GroupMetrics {
    /// EWMA-smoothed latency, seconds. The first sample sets it directly.
    pub ewma_latency: Option<f64>,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total: u64,
}

impl GroupMetrics {
    pub(crate) fn record_success(&mut self, latency: Duration, alpha: f64) {
        let sample = latency.as_secs_f64();
        self.ewma_latency = Some(match self.ewma_latency {
            Some(ewma) => alpha * sample + (1.0 - alpha) * ewma,
            None => sample,
        });
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.total += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.total += 1;
    }
}

/// Configuration for adaptive interval control.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Floor for the decided interval.
    pub min_interval: Duration,
    /// Ceiling for the decided interval (and for `Retry-After` overrides).
    pub max_interval: Duration,
    /// Multiplier applied to the current interval on a failure trigger.
    pub increase_factor: f64,
    /// Subtracted from the current interval after a success streak.
    pub decrease_step: Duration,
    /// Consecutive successes required before the interval decreases.
    pub success_threshold: u32,
    /// Smoothing factor for the latency EWMA, in (0, 1].
    pub ewma_alpha: f64,
    /// Honour `Retry-After` as the next interval when present.
    pub respect_retry_after: bool,
    /// Copy failure triggers from the retry configuration (wired by the
    /// facade at startup).
    pub inherit_retry_triggers: bool,
    /// Statuses treated as failure triggers.
    pub trigger_statuses: Vec<u16>,
    /// Error kinds treated as failure triggers.
    pub trigger_kinds: Vec<ErrorKind>,
}

impl AdaptiveConfig {
    pub fn builder() -> AdaptiveConfigBuilder {
        AdaptiveConfigBuilder::new()
    }

    /// Checks value ranges; called at engine assembly time.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.ewma_alpha <= 0.0 || self.ewma_alpha > 1.0 {
            return Err(ScrapeError::Config(format!(
                "ewma_alpha must be in (0, 1], got {}",
                self.ewma_alpha
            )));
        }
        if self.increase_factor < 1.0 {
            return Err(ScrapeError::Config(format!(
                "increase_factor must be >= 1.0, got {}",
                self.increase_factor
            )));
        }
        if self.min_interval > self.max_interval {
            return Err(ScrapeError::Config(
                "min_interval cannot exceed max_interval".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`AdaptiveConfig`].
#[derive(Debug, Clone)]
pub struct AdaptiveConfigBuilder {
    min_interval: Duration,
    max_interval: Duration,
    increase_factor: f64,
    decrease_step: Duration,
    success_threshold: u32,
    ewma_alpha: f64,
    respect_retry_after: bool,
    inherit_retry_triggers: bool,
    trigger_statuses: Vec<u16>,
    trigger_kinds: Vec<ErrorKind>,
}

impl Default for AdaptiveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - min_interval: 10ms, max_interval: 60s
    /// - increase_factor: 2.0, decrease_step: 50ms
    /// - success_threshold: 5
    /// - ewma_alpha: 0.3
    /// - respect_retry_after: true, inherit_retry_triggers: true
    /// - trigger_statuses: 500, 502, 503, 504, 522, 524, 408, 429
    /// - trigger_kinds: timeout
    pub fn new() -> Self {
        Self {
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(60),
            increase_factor: 2.0,
            decrease_step: Duration::from_millis(50),
            success_threshold: 5,
            ewma_alpha: 0.3,
            respect_retry_after: true,
            inherit_retry_triggers: true,
            trigger_statuses: vec![500, 502, 503, 504, 522, 524, 408, 429],
            trigger_kinds: vec![ErrorKind::Timeout],
        }
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn increase_factor(mut self, factor: f64) -> Self {
        self.increase_factor = factor;
        self
    }

    pub fn decrease_step(mut self, step: Duration) -> Self {
        self.decrease_step = step;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn ewma_alpha(mut self, alpha: f64) -> Self {
        self.ewma_alpha = alpha;
        self
    }

    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    pub fn inherit_retry_triggers(mut self, inherit: bool) -> Self {
        self.inherit_retry_triggers = inherit;
        self
    }

    pub fn trigger_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.trigger_statuses = statuses;
        self
    }

    pub fn trigger_kinds(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.trigger_kinds = kinds;
        self
    }

    pub fn build(self) -> AdaptiveConfig {
        AdaptiveConfig {
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            increase_factor: self.increase_factor,
            decrease_step: self.decrease_step,
            success_threshold: self.success_threshold,
            ewma_alpha: self.ewma_alpha,
            respect_retry_after: self.respect_retry_after,
            inherit_retry_triggers: self.inherit_retry_triggers,
            trigger_statuses: self.trigger_statuses,
            trigger_kinds: self.trigger_kinds,
        }
    }
}

struct GroupState {
    metrics: GroupMetrics,
    interval: Duration,
}

/// Decides each group's next interval from reported outcomes.
pub(crate) struct AdaptiveController {
    config: AdaptiveConfig,
    states: Mutex<HashMap<String, GroupState>>,
}

impl AdaptiveController {
    pub(crate) fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a group's starting interval, preferring the last decided
    /// interval when the group was seen before (groups are recreated after
    /// idle cleanup and should not forget their throttle level).
    pub(crate) fn seed(&self, key: &str, fallback: Duration) -> Duration {
        let mut states = self.states.lock().unwrap();
        states
            .entry(key.to_string())
            .or_insert_with(|| GroupState {
                metrics: GroupMetrics::default(),
                interval: fallback,
            })
            .interval
    }

    /// Records the outcome and returns the group's next interval.
    /// Metrics are updated before the interval decision so the EWMA
    /// reflects this sample.
    pub(crate) fn on_outcome(&self, outcome: &RequestOutcome) -> Duration {
        let is_failure = self.matches_trigger(outcome);

        let mut states = self.states.lock().unwrap();
        let state = states
            .entry(outcome.group_key.clone())
            .or_insert_with(|| GroupState {
                metrics: GroupMetrics::default(),
                interval: self.config.min_interval,
            });

        if is_failure {
            state.metrics.record_failure();
        } else {
            state
                .metrics
                .record_success(outcome.latency, self.config.ewma_alpha);
        }

        let current = state.interval;
        let max = self.config.max_interval;
        let min = self.config.min_interval;

        let next = if self.config.respect_retry_after && outcome.retry_after.is_some() {
            let retry_after = outcome.retry_after.unwrap_or_default();
            retry_after.min(max)
        } else if is_failure {
            let scaled = current.as_secs_f64() * self.config.increase_factor;
            Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
        } else if state.metrics.consecutive_successes >= self.config.success_threshold {
            state.metrics.consecutive_successes = 0;
            current.saturating_sub(self.config.decrease_step).max(min)
        } else {
            current
        };

        state.interval = next;
        next
    }

    #[cfg(test)]
    pub(crate) fn metrics(&self, key: &str) -> Option<GroupMetrics> {
        self.states
            .lock()
            .unwrap()
            .get(key)
            .map(|s| s.metrics.clone())
    }

    fn matches_trigger(&self, outcome: &RequestOutcome) -> bool {
        if let Some(status) = outcome.status {
            if self.config.trigger_statuses.contains(&status.as_u16()) {
                return true;
            }
        }
        if let Some(kind) = outcome.error_kind {
            if self.config.trigger_kinds.contains(&kind) {
                return true;
            }
        }
        false
    }
}
