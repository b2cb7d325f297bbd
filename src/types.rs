//! Core domain types: the canonical [`Transaction`] entity and its supporting value types.
//!
//! These are plain data — all mutation happens through [`crate::state_machine`].

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::util::money_amount::Amount;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\+?[1-9]\d{7,14})$").unwrap());
static USER_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,64}$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid phone number")]
    InvalidPhone,
    #[error("invalid user id")]
    InvalidUserId,
}

/// A phone number canonicalised to E.164 form (digits only, optional leading `+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phone(String);

impl Phone {
    /// Strips non-digit characters (keeping a leading `+`) and validates against
    /// the canonical regex from spec §6.3.
    pub fn canonicalise(raw: &str) -> Result<Self, ValidationError> {
        let mut cleaned = String::with_capacity(raw.len());
        let mut chars = raw.trim().chars().peekable();
        if let Some('+') = chars.peek() {
            cleaned.push('+');
            chars.next();
        }
        for c in chars {
            if c.is_ascii_digit() {
                cleaned.push(c);
            }
        }
        if !PHONE_RE.is_match(&cleaned) {
            return Err(ValidationError::InvalidPhone);
        }
        Ok(Phone(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, without the leading `+`, used for prefix matching.
    pub fn digits(&self) -> &str {
        self.0.trim_start_matches('+')
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated client-supplied user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if !USER_ID_RE.is_match(raw) {
            return Err(ValidationError::InvalidUserId);
        }
        Ok(UserId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A provider tag, e.g. `"mtn"`, `"airteltigo"`, `"vodafone"`.
pub type ProviderTag = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Refund,
    Transfer,
}

/// The eight canonical statuses of spec §4.7. Transitions between them are
/// only ever performed by [`crate::state_machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Processing,
    Confirmed,
    Failed,
    Expired,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    /// A terminal status is one no transition ever leaves (spec I2).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed
                | TransactionStatus::Failed
                | TransactionStatus::Expired
                | TransactionStatus::Cancelled
                | TransactionStatus::Refunded
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of a single provider attempt, appended to [`Transaction::attempts`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub provider_tag: ProviderTag,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: AttemptOutcome,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ConfirmedAfterStatusProbe,
    Retryable,
    NonRetryable,
    CircuitOpen,
}

/// An append-only audit log entry, written by every state transition (spec §3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub transaction_id: Uuid,
    pub sequence: u64,
    pub from_status: Option<TransactionStatus>,
    pub to_status: TransactionStatus,
    pub trigger: AuditTrigger,
    pub recorded_at: DateTime<Utc>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTrigger {
    Orchestrator,
    Webhook,
    Sweeper,
    Cancellation,
    PostTerminalCallback,
    PostCancelConfirmation,
}

/// The single authoritative entity (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub external_reference: String,
    pub user_id: UserId,
    pub amount: Amount,
    pub currency: String,
    pub recipient_phone: Phone,
    pub recipient_name: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub primary_provider: Option<ProviderTag>,
    pub provider_reference: Option<String>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub attempts: Vec<Attempt>,
    pub cross_network: bool,
    pub failure_reason: Option<String>,
    pub failure_error_code: Option<String>,
    /// Set for `transaction_type = refund`: the id of the transaction being refunded.
    pub refund_of: Option<Uuid>,
}

impl Transaction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
