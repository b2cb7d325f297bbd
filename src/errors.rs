//! Canonical error kinds for the orchestrator (spec §7).
//!
//! Every outcome the orchestrator can produce is represented as an explicit
//! variant here rather than an out-of-band control-flow exception, and each
//! variant maps to exactly one HTTP status code via [`IntoResponse`].

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::types::ValidationError;
use crate::util::money_amount::AmountParseError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("multi-factor authentication required for this amount")]
    MfaRequired,

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("provider {provider_tag} rate limited us, retry after {retry_after_seconds}s")]
    ProviderRateLimited { provider_tag: String, retry_after_seconds: u64 },

    #[error("idempotency key already used with a different request body")]
    IdempotencyConflict,

    #[error("a request with this idempotency key is already in flight")]
    DuplicateInFlight { transaction_id: Uuid },

    #[error("transaction blocked: fraud detected")]
    FraudBlocked,

    #[error("transaction requires additional verification")]
    FraudRequiresVerification,

    #[error("no eligible provider for this request")]
    NoEligibleProvider,

    #[error("provider {provider_tag} circuit is open")]
    CircuitOpen { provider_tag: String },

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    #[error("concurrent state transition, re-read and decide")]
    ConcurrentTransition,

    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("internal error: {0}")]
    Unknown(String),
}

impl From<AmountParseError> for OrchestratorError {
    fn from(err: AmountParseError) -> Self {
        OrchestratorError::Validation(err.to_string())
    }
}

impl From<ValidationError> for OrchestratorError {
    fn from(err: ValidationError) -> Self {
        OrchestratorError::Validation(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<Uuid>,
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            OrchestratorError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            OrchestratorError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            OrchestratorError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            OrchestratorError::MfaRequired => (StatusCode::UNAUTHORIZED, "mfa_required"),
            OrchestratorError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            OrchestratorError::ProviderRateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "provider_rate_limited")
            }
            OrchestratorError::IdempotencyConflict => (StatusCode::CONFLICT, "idempotency_conflict"),
            OrchestratorError::DuplicateInFlight { .. } => {
                (StatusCode::CONFLICT, "duplicate_in_flight")
            }
            OrchestratorError::FraudBlocked => (StatusCode::UNPROCESSABLE_ENTITY, "fraud_blocked"),
            OrchestratorError::FraudRequiresVerification => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "fraud_requires_verification",
            ),
            OrchestratorError::NoEligibleProvider => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no_eligible_provider")
            }
            OrchestratorError::CircuitOpen { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "circuit_open")
            }
            OrchestratorError::ProviderTransient(_) => {
                (StatusCode::BAD_GATEWAY, "provider_transient")
            }
            OrchestratorError::ProviderPermanent(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "provider_permanent")
            }
            OrchestratorError::ConcurrentTransition => {
                (StatusCode::CONFLICT, "concurrent_transition")
            }
            OrchestratorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            OrchestratorError::Unknown(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let transaction_id = match &self {
            OrchestratorError::DuplicateInFlight { transaction_id } => Some(*transaction_id),
            OrchestratorError::NotFound(id) => Some(*id),
            _ => None,
        };

        let body = ErrorBody {
            error: code,
            message: self.to_string(),
            transaction_id,
        };

        let mut response = (status, Json(json!(body))).into_response();
        let retry_after_seconds = match &self {
            OrchestratorError::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            OrchestratorError::ProviderRateLimited { retry_after_seconds, .. } => Some(*retry_after_seconds),
            _ => None,
        };
        if let Some(seconds) = retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        if matches!(self, OrchestratorError::Unauthorized(_)) {
            response.headers_mut().insert("WWW-Authenticate", HeaderValue::from_static("Bearer"));
        }
        response
    }
}
