//! Inbound rate limiting (spec §4.2, C3).
//!
//! Two interchangeable algorithms selected per endpoint, plus a shared
//! block-list: once a `(key, endpoint)` pair is denied it is refused outright
//! for `block_duration_seconds` without re-evaluating the algorithm.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    TokenBucket,
    SlidingWindow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_seconds: u64,
    pub burst: u32,
    pub block_duration_seconds: u64,
    pub algorithm: RateLimitAlgorithm,
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_seconds: Option<u64>,
}

enum AlgorithmState {
    TokenBucket { tokens: f64, last_refill: DateTime<Utc> },
    SlidingWindow { timestamps: VecDeque<DateTime<Utc>> },
}

struct BucketState {
    algorithm: AlgorithmState,
    blocked_until: Option<DateTime<Utc>>,
}

/// Per-`(scope, endpoint)` admission control. One instance shared by the whole orchestrator.
pub struct RateLimiter {
    buckets: DashMap<(String, String), Mutex<BucketState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Checks and atomically admits/denies a request for `(key, endpoint)`.
    pub fn check(&self, key: &str, endpoint: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = Utc::now();
        let capacity = config.requests_per_window + config.burst;
        let bucket_key = (key.to_string(), endpoint.to_string());

        let entry = self.buckets.entry(bucket_key).or_insert_with(|| {
            Mutex::new(BucketState {
                algorithm: match config.algorithm {
                    RateLimitAlgorithm::TokenBucket => AlgorithmState::TokenBucket {
                        tokens: capacity as f64,
                        last_refill: now,
                    },
                    RateLimitAlgorithm::SlidingWindow => AlgorithmState::SlidingWindow {
                        timestamps: VecDeque::new(),
                    },
                },
                blocked_until: None,
            })
        });
        let mut state = entry.lock().expect("rate limiter mutex poisoned");

        if let Some(blocked_until) = state.blocked_until {
            if now < blocked_until {
                return RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: blocked_until,
                    retry_after_seconds: Some((blocked_until - now).num_seconds().max(0) as u64),
                };
            }
            state.blocked_until = None;
        }

        let decision = match &mut state.algorithm {
            AlgorithmState::TokenBucket { tokens, last_refill } => {
                let elapsed = (now - *last_refill).num_milliseconds().max(0) as f64 / 1000.0;
                let refill_rate = config.requests_per_window as f64 / config.window_seconds as f64;
                *tokens = (*tokens + elapsed * refill_rate).min(capacity as f64);
                *last_refill = now;
                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    RateLimitDecision {
                        allowed: true,
                        remaining: tokens.floor() as u32,
                        reset_at: now + chrono::Duration::seconds(config.window_seconds as i64),
                        retry_after_seconds: None,
                    }
                } else {
                    let seconds_to_next = ((1.0 - *tokens) / refill_rate).ceil() as u64;
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: now + chrono::Duration::seconds(seconds_to_next as i64),
                        retry_after_seconds: Some(seconds_to_next),
                    }
                }
            }
            AlgorithmState::SlidingWindow { timestamps } => {
                let window_start = now - chrono::Duration::seconds(config.window_seconds as i64);
                while let Some(front) = timestamps.front() {
                    if *front < window_start {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if (timestamps.len() as u32) < capacity {
                    timestamps.push_back(now);
                    RateLimitDecision {
                        allowed: true,
                        remaining: capacity - timestamps.len() as u32,
                        reset_at: window_start + chrono::Duration::seconds(config.window_seconds as i64),
                        retry_after_seconds: None,
                    }
                } else {
                    let oldest = *timestamps.front().expect("non-empty by construction");
                    let retry_after = (oldest + chrono::Duration::seconds(config.window_seconds as i64) - now)
                        .num_seconds()
                        .max(0) as u64;
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: oldest + chrono::Duration::seconds(config.window_seconds as i64),
                        retry_after_seconds: Some(retry_after),
                    }
                }
            }
        };

        if !decision.allowed {
            state.blocked_until = Some(now + chrono::Duration::seconds(config.block_duration_seconds as i64));
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_bucket_config() -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: 5,
            window_seconds: 60,
            burst: 2,
            block_duration_seconds: 30,
            algorithm: RateLimitAlgorithm::TokenBucket,
        }
    }

    #[test]
    fn admits_exactly_capacity_then_rejects() {
        let limiter = RateLimiter::new();
        let config = token_bucket_config();
        let mut admitted = 0;
        for _ in 0..7 {
            if limiter.check("u1", "payments_initiate", &config).allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 7); // capacity = 5 + 2 burst
        let next = limiter.check("u1", "payments_initiate", &config);
        assert!(!next.allowed);
        assert!(next.retry_after_seconds.is_some());
    }

    #[test]
    fn blocked_key_is_rejected_immediately_during_block_window() {
        let limiter = RateLimiter::new();
        let config = token_bucket_config();
        for _ in 0..8 {
            limiter.check("u2", "payments_initiate", &config);
        }
        let decision = limiter.check("u2", "payments_initiate", &config);
        assert!(!decision.allowed);
        assert!(decision.retry_after_seconds.unwrap() > 0);
    }

    #[test]
    fn different_keys_are_independent() {
        let limiter = RateLimiter::new();
        let config = token_bucket_config();
        for _ in 0..7 {
            limiter.check("u3", "payments_initiate", &config);
        }
        assert!(limiter.check("u4", "payments_initiate", &config).allowed);
    }
}
