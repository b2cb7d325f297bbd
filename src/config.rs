//! Configuration surface for the orchestrator (spec §6.5).
//!
//! Mirrors the teacher pattern: a `clap`-parsed CLI pointing at a JSON config
//! file, deserialised with `serde`, with defaults for every ambient field so a
//! minimal file still boots a usable server.

use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::breaker::BreakerConfig;
use crate::rate_limiter::{RateLimitAlgorithm, RateLimitConfig};
use crate::retry::RetryConfig;
use crate::types::ProviderTag;

#[derive(Parser, Debug)]
#[command(name = "momo-orchestrator")]
#[command(about = "Mobile-money payment orchestrator")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::host")]
    pub host: IpAddr,
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default)]
    pub transaction: TransactionConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "defaults::min_amount")]
    pub min_amount: String,
    #[serde(default = "defaults::max_amount")]
    pub max_amount: String,
    #[serde(default = "defaults::timeout_seconds")]
    pub timeout_seconds: i64,
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            min_amount: defaults::min_amount(),
            max_amount: defaults::max_amount(),
            timeout_seconds: defaults::timeout_seconds(),
            max_retries: defaults::max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "defaults::idempotency_ttl_seconds")]
    pub ttl_seconds: i64,
    #[serde(default = "defaults::processing_timeout_seconds")]
    pub processing_timeout_seconds: i64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: defaults::idempotency_ttl_seconds(),
            processing_timeout_seconds: defaults::processing_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "defaults::sweeper_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: defaults::sweeper_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret bearer tokens are signed with. The default is a placeholder;
    /// any deployment must override it via the config file or `AUTH__JWT_SECRET`.
    #[serde(default = "defaults::jwt_secret")]
    pub jwt_secret: String,
    /// Amounts at or above this threshold require an `X-MFA-Token` header.
    #[serde(default = "defaults::mfa_amount_threshold")]
    pub mfa_amount_threshold: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: defaults::jwt_secret(),
            mfa_amount_threshold: defaults::mfa_amount_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderLimits {
    pub min: String,
    pub max: String,
    pub daily: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub tag: ProviderTag,
    /// Index into the caller's credential store; kept opaque here deliberately —
    /// the orchestrator never inspects provider credentials (spec §4.4).
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub sandbox: bool,
    pub limits: ProviderLimits,
    pub priority: u32,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

mod defaults {
    pub fn host() -> std::net::IpAddr {
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
    }
    pub fn port() -> u16 {
        8080
    }
    pub fn min_amount() -> String {
        "1.00".to_string()
    }
    pub fn max_amount() -> String {
        "10000.00".to_string()
    }
    pub fn timeout_seconds() -> i64 {
        900
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn idempotency_ttl_seconds() -> i64 {
        86_400
    }
    pub fn processing_timeout_seconds() -> i64 {
        30
    }
    pub fn sweeper_interval_seconds() -> u64 {
        30
    }
    pub fn jwt_secret() -> String {
        "change-me-in-production".to_string()
    }
    pub fn mfa_amount_threshold() -> String {
        "5000.00".to_string()
    }
}

impl Config {
    /// Parses CLI args, loads the pointed-to JSON file and applies `serde` defaults.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let args = CliArgs::parse();
        let raw = fs::read_to_string(&args.config)
            .map_err(|e| format!("failed to read config file {:?}: {e}", args.config))?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn rate_limit_for(&self, endpoint: &str) -> RateLimitConfig {
        self.rate_limits
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| RateLimitConfig {
                requests_per_window: 60,
                window_seconds: 60,
                burst: 10,
                block_duration_seconds: 60,
                algorithm: RateLimitAlgorithm::TokenBucket,
            })
    }
}
