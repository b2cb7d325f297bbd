//! Per-provider circuit breaker (spec §4.5, C2).
//!
//! Wraps a single adapter call with a three-state machine. State transitions
//! are serialised per breaker via a short-held `Mutex`; the lock is never
//! held across the wrapped call itself.

use dashmap::DashMap;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::OrchestratorError;
use crate::types::ProviderTag;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "defaults::success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "defaults::timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "defaults::slow_call_threshold_ms")]
    pub slow_call_threshold_ms: u64,
    #[serde(default = "defaults::slow_call_rate_threshold")]
    pub slow_call_rate_threshold: f64,
    #[serde(default = "defaults::minimum_calls")]
    pub minimum_calls: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::failure_threshold(),
            success_threshold: defaults::success_threshold(),
            timeout_seconds: defaults::timeout_seconds(),
            slow_call_threshold_ms: defaults::slow_call_threshold_ms(),
            slow_call_rate_threshold: defaults::slow_call_rate_threshold(),
            minimum_calls: defaults::minimum_calls(),
        }
    }
}

mod defaults {
    pub fn failure_threshold() -> u32 {
        5
    }
    pub fn success_threshold() -> u32 {
        2
    }
    pub fn timeout_seconds() -> u64 {
        30
    }
    pub fn slow_call_threshold_ms() -> u64 {
        5_000
    }
    pub fn slow_call_rate_threshold() -> f64 {
        0.5
    }
    pub fn minimum_calls() -> usize {
        10
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_state_change: Instant,
    recent_call_durations: VecDeque<(Duration, bool)>,
}

/// A single provider's circuit breaker. One instance per provider tag.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

/// Outcome recorded against the breaker after a wrapped call completes.
pub enum CallOutcome {
    Success,
    Failure,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_state_change: Instant::now(),
                recent_call_durations: VecDeque::with_capacity(config.minimum_calls),
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open
            && inner.last_state_change.elapsed() >= Duration::from_secs(self.config.timeout_seconds)
        {
            inner.state = BreakerState::HalfOpen;
            inner.last_state_change = Instant::now();
        }
    }

    /// Admits a probe, returning `Err(CircuitOpen)` if the breaker currently
    /// refuses calls (spec P6: no call reaches a provider in `open` state
    /// before `timeout_seconds` has elapsed).
    pub fn admit(&self, provider_tag: &str) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        self.maybe_transition_to_half_open(&mut inner);
        match inner.state {
            BreakerState::Open => Err(OrchestratorError::CircuitOpen {
                provider_tag: provider_tag.to_string(),
            }),
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
        }
    }

    /// Records the outcome and duration of an admitted call. Never held
    /// across the adapter call itself — call this afterward.
    pub fn record(&self, outcome: CallOutcome, duration: Duration) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        let is_slow = duration.as_millis() as u64 > self.config.slow_call_threshold_ms;
        let success = matches!(outcome, CallOutcome::Success);

        if inner.recent_call_durations.len() >= self.config.minimum_calls {
            inner.recent_call_durations.pop_front();
        }
        inner.recent_call_durations.push_back((duration, is_slow));

        match inner.state {
            BreakerState::Closed => {
                if success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                }
                let slow_rate = Self::slow_rate(&inner.recent_call_durations);
                let threshold_breached = inner.consecutive_failures >= self.config.failure_threshold
                    || (inner.recent_call_durations.len() >= self.config.minimum_calls
                        && slow_rate > self.config.slow_call_rate_threshold);
                if threshold_breached {
                    inner.state = BreakerState::Open;
                    inner.last_state_change = Instant::now();
                    inner.consecutive_failures = 0;
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.state = BreakerState::Closed;
                        inner.last_state_change = Instant::now();
                        inner.consecutive_successes = 0;
                        inner.consecutive_failures = 0;
                        inner.recent_call_durations.clear();
                    }
                } else {
                    inner.state = BreakerState::Open;
                    inner.last_state_change = Instant::now();
                    inner.consecutive_successes = 0;
                }
            }
            BreakerState::Open => {
                // A call should never be recorded while open; admit() refuses first.
            }
        }
    }

    fn slow_rate(durations: &VecDeque<(Duration, bool)>) -> f64 {
        if durations.is_empty() {
            return 0.0;
        }
        let slow = durations.iter().filter(|(_, slow)| *slow).count();
        slow as f64 / durations.len() as f64
    }
}

/// Registry of per-provider breakers, built once at startup from configuration.
///
/// Mirrors how the teacher keys its provider caches by network tag: one
/// breaker per provider, looked up by tag, never recreated at request time.
pub struct BreakerRegistry {
    breakers: DashMap<ProviderTag, CircuitBreaker>,
}

impl BreakerRegistry {
    pub fn new(configs: impl IntoIterator<Item = (ProviderTag, BreakerConfig)>) -> Self {
        let breakers = DashMap::new();
        for (tag, config) in configs {
            breakers.insert(tag, CircuitBreaker::new(config));
        }
        Self { breakers }
    }

    pub fn is_open(&self, provider_tag: &str) -> bool {
        self.breakers
            .get(provider_tag)
            .map(|b| b.state() == BreakerState::Open)
            .unwrap_or(false)
    }

    pub fn admit(&self, provider_tag: &str) -> Result<(), OrchestratorError> {
        match self.breakers.get(provider_tag) {
            Some(breaker) => breaker.admit(provider_tag),
            None => Ok(()),
        }
    }

    pub fn record(&self, provider_tag: &str, outcome: CallOutcome, duration: Duration) {
        if let Some(breaker) = self.breakers.get(provider_tag) {
            breaker.record(outcome, duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_seconds: 30,
            slow_call_threshold_ms: 5_000,
            slow_call_rate_threshold: 0.5,
            minimum_calls: 10,
        }
    }

    #[test]
    fn opens_after_consecutive_failures_reach_threshold() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            breaker.admit("mtn").unwrap();
            breaker.record(CallOutcome::Failure, Duration::from_millis(10));
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.admit("mtn").is_err());
    }

    #[test]
    fn half_open_probe_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            breaker.admit("mtn").unwrap();
            breaker.record(CallOutcome::Failure, Duration::from_millis(10));
        }
        {
            let mut inner = breaker.inner.lock().unwrap();
            inner.last_state_change = Instant::now() - Duration::from_secs(31);
        }
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.admit("mtn").unwrap();
        breaker.record(CallOutcome::Success, Duration::from_millis(10));
        breaker.admit("mtn").unwrap();
        breaker.record(CallOutcome::Success, Duration::from_millis(10));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            breaker.admit("mtn").unwrap();
            breaker.record(CallOutcome::Failure, Duration::from_millis(10));
        }
        {
            let mut inner = breaker.inner.lock().unwrap();
            inner.last_state_change = Instant::now() - Duration::from_secs(31);
        }
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.admit("mtn").unwrap();
        breaker.record(CallOutcome::Failure, Duration::from_millis(10));
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
