//! Retry and failover engine (spec §4.6, C5).
//!
//! Wraps a sequence of provider attempts with exponential backoff and jitter,
//! classifying every adapter error into retryable/non-retryable/circuit-open
//! before deciding whether to back off, fail over to the next provider, or
//! give up. An ambiguous-outcome error (a timeout where the provider may or
//! may not have processed the payment) is never retried blindly: the caller
//! must probe `status()` first (spec L2, S7) before attempting again.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

use crate::provider::AdapterError;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
    #[serde(default = "defaults::jitter_fraction")]
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            multiplier: defaults::multiplier(),
            jitter_fraction: defaults::jitter_fraction(),
        }
    }
}

mod defaults {
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay_ms() -> u64 {
        500
    }
    pub fn max_delay_ms() -> u64 {
        8_000
    }
    pub fn multiplier() -> f64 {
        2.0
    }
    pub fn jitter_fraction() -> f64 {
        0.1
    }
}

impl RetryConfig {
    /// Backoff for the given zero-indexed attempt number, with ±`jitter_fraction` jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        let jitter_span = capped * self.jitter_fraction;
        let jittered = capped + rand::rng().random_range(-jitter_span..=jitter_span);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// What to do next with a failed adapter call, after classification.
#[derive(Debug, Clone, Copy)]
pub enum RetryDecision {
    /// Retry the same provider after backing off.
    RetrySameProvider,
    /// Stop retrying this provider and fail over to the next eligible one.
    FailoverToNextProvider,
    /// Query `status()` before doing anything else; the outcome is unknown.
    ProbeStatusFirst,
    /// The provider itself is rate limiting us; back off and fail over rather
    /// than retry the same provider immediately (spec §4.6).
    RetryAfter(Duration),
    /// Permanent failure; no further attempts make sense.
    GiveUp,
}

impl PartialEq for RetryDecision {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (RetryDecision::RetrySameProvider, RetryDecision::RetrySameProvider)
                | (RetryDecision::FailoverToNextProvider, RetryDecision::FailoverToNextProvider)
                | (RetryDecision::ProbeStatusFirst, RetryDecision::ProbeStatusFirst)
                | (RetryDecision::GiveUp, RetryDecision::GiveUp)
                | (RetryDecision::RetryAfter(_), RetryDecision::RetryAfter(_))
        )
    }
}
impl Eq for RetryDecision {}

/// Classifies an adapter error into a retry decision (spec §4.6 classification table).
pub fn classify(error: &AdapterError, attempts_on_provider: u32, config: &RetryConfig) -> RetryDecision {
    match error {
        AdapterError::AmbiguousTimeout { .. } => RetryDecision::ProbeStatusFirst,
        AdapterError::Permanent(_) => RetryDecision::FailoverToNextProvider,
        AdapterError::RateLimited => RetryDecision::RetryAfter(config.backoff_for(attempts_on_provider)),
        AdapterError::Transient(_) => {
            if attempts_on_provider + 1 < config.max_attempts {
                RetryDecision::RetrySameProvider
            } else {
                RetryDecision::FailoverToNextProvider
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_capped() {
        let config = RetryConfig::default();
        let first = config.backoff_for(0);
        let third = config.backoff_for(3);
        assert!(first.as_millis() > 0);
        assert!(third.as_millis() as u64 <= config.max_delay_ms + (config.max_delay_ms as f64 * config.jitter_fraction) as u64);
    }

    #[test]
    fn ambiguous_timeout_always_requires_a_status_probe() {
        let config = RetryConfig::default();
        let decision = classify(&AdapterError::AmbiguousTimeout { provider_tx_id: "x".into() }, 0, &config);
        assert_eq!(decision, RetryDecision::ProbeStatusFirst);
    }

    #[test]
    fn transient_error_retries_until_attempt_budget_then_fails_over() {
        let config = RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        };
        let err = AdapterError::Transient("timeout".into());
        assert_eq!(classify(&err, 0, &config), RetryDecision::RetrySameProvider);
        assert_eq!(classify(&err, 1, &config), RetryDecision::FailoverToNextProvider);
    }

    #[test]
    fn permanent_error_always_fails_over() {
        let config = RetryConfig::default();
        let err = AdapterError::Permanent("invalid recipient".into());
        assert_eq!(classify(&err, 0, &config), RetryDecision::FailoverToNextProvider);
    }

    #[test]
    fn rate_limited_backs_off_rather_than_retrying_same_provider() {
        let config = RetryConfig::default();
        let decision = classify(&AdapterError::RateLimited, 0, &config);
        assert!(matches!(decision, RetryDecision::RetryAfter(_)));
    }
}
