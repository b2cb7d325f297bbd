//! Provider adapter contract (spec §4.4, C1).
//!
//! A single capability contract over heterogeneous provider APIs. Only
//! adapters are permitted to know about provider-specific authentication,
//! signature schemes, status-string dialects or phone-prefix tables; every
//! component above this module works exclusively in canonical statuses and
//! canonical errors — mirroring how the teacher's `ChainProvider` enum hides
//! chain-specific RPC details behind one interface.

pub mod airteltigo;
pub mod mtn;
pub mod vodafone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::ProviderTag;
use crate::util::money_amount::Amount;

/// Canonical provider-reported status, distinct from any provider-native string
/// (spec glossary: "Canonical status").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Pending,
    Processing,
    Confirmed,
    Failed,
}

/// Errors an adapter call can fail with, already classified per spec §7.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("provider transient error: {0}")]
    Transient(String),
    #[error("provider permanent error: {0}")]
    Permanent(String),
    #[error("provider rate limited us")]
    RateLimited,
    #[error("provider call timed out, outcome unknown")]
    AmbiguousTimeout { provider_tx_id: String },
}

#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub transaction_id: uuid::Uuid,
    pub amount: Amount,
    pub recipient_phone: String,
    pub recipient_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub provider_tx_id: String,
    pub provider_reference: Option<String>,
    pub status: ProviderStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderLimits {
    pub min: Amount,
    pub max: Amount,
    pub daily: Amount,
}

/// A verified webhook callback, already mapped to canonical status.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub provider_tx_id: String,
    pub status: ProviderStatus,
    pub provider_reference: Option<String>,
    pub raw: serde_json::Value,
}

/// The uniform contract every mobile-money provider implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_tag(&self) -> &str;

    /// Pure prefix test against the destination phone (digits only, no `+`).
    fn supports_phone(&self, phone_digits: &str) -> bool;

    fn limits(&self) -> ProviderLimits;

    /// Refreshes provider credentials; idempotent; caches the token with its expiry.
    async fn authenticate(&self) -> Result<(), AdapterError>;

    async fn initiate(&self, request: &InitiateRequest) -> Result<ProviderResponse, AdapterError>;

    /// Idempotent: querying status never has side effects (spec L2).
    async fn status(&self, provider_tx_id: &str) -> Result<ProviderResponse, AdapterError>;

    async fn refund(
        &self,
        original_provider_tx_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<String, AdapterError>;

    /// Verifies an inbound webhook's signature and parses it. Returns `None`
    /// on a bad signature rather than erroring, per spec §4.4.
    fn verify_webhook(&self, payload: &[u8], headers: &HashMap<String, String>) -> Option<WebhookEvent>;

    /// Total function mapping a provider-native status string to the canonical enum.
    fn map_status(&self, provider_status: &str) -> ProviderStatus;
}

/// Registry of configured adapters, built once at startup.
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn by_tag(&self, tag: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|a| a.provider_tag() == tag).cloned()
    }

    /// All adapters, in the configured priority order (spec §4.9 step 1).
    pub fn all(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }
}
