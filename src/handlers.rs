//! HTTP surface (spec §6.1).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, permissions};
use crate::errors::OrchestratorError;
use crate::orchestrator::{Orchestrator, PaymentRequest};
use crate::util::money_amount::Amount;
use crate::webhook::{self, WebhookAck};

pub type AppState = Arc<Orchestrator>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/payments", post(create_payment))
        .route("/payments/{id}", get(get_payment))
        .route("/payments/{id}/cancel", post(cancel_payment))
        .route("/payments/{id}/refund", post(refund_payment))
        .route("/webhooks/{provider_tag}", post(receive_webhook))
}

async fn root() -> &'static str {
    "mobile-money payment orchestrator"
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct CreatePaymentBody {
    user_id: String,
    amount: String,
    recipient_phone: String,
    recipient_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

async fn create_payment(
    State(orchestrator): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentBody>,
) -> Result<Json<Value>, OrchestratorError> {
    let claims = auth::authenticate(&headers, &orchestrator.config.auth.jwt_secret)?;
    auth::require_permission(&claims, permissions::PAYMENT_INITIATE)?;
    let amount = Amount::parse(&body.amount)?;
    let threshold = Amount::parse(&orchestrator.config.auth.mfa_amount_threshold)?;
    auth::require_mfa_if_large(&headers, amount, threshold)?;

    let _ = body.metadata;
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = orchestrator
        .initiate_payment(PaymentRequest {
            user_id: body.user_id,
            amount: body.amount,
            recipient_phone: body.recipient_phone,
            recipient_name: body.recipient_name,
            description: body.description,
            idempotency_key,
        })
        .await?;

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct TransactionView {
    transaction_id: Uuid,
    status: String,
    amount: String,
    recipient_phone: String,
    primary_provider: Option<String>,
    cross_network: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    confirmed_at: Option<chrono::DateTime<chrono::Utc>>,
    failure_reason: Option<String>,
}

async fn get_payment(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<TransactionView>, OrchestratorError> {
    let claims = auth::authenticate(&headers, &orchestrator.config.auth.jwt_secret)?;
    auth::require_permission(&claims, permissions::PAYMENT_STATUS)?;
    let transaction = orchestrator.get_transaction(id).await?;
    Ok(Json(TransactionView {
        transaction_id: transaction.id,
        status: transaction.status.to_string(),
        amount: transaction.amount.to_string(),
        recipient_phone: transaction.recipient_phone.as_str().to_string(),
        primary_provider: transaction.primary_provider,
        cross_network: transaction.cross_network,
        created_at: transaction.created_at,
        updated_at: transaction.updated_at,
        confirmed_at: transaction.confirmed_at,
        failure_reason: transaction.failure_reason,
    }))
}

#[derive(Debug, Deserialize)]
struct CancelBody {
    user_id: String,
}

async fn cancel_payment(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<CancelBody>,
) -> Result<Json<Value>, OrchestratorError> {
    let claims = auth::authenticate(&headers, &orchestrator.config.auth.jwt_secret)?;
    auth::require_permission(&claims, permissions::PAYMENT_INITIATE)?;
    let transaction = orchestrator.cancel(id, &body.user_id).await?;
    Ok(Json(json!({"transaction_id": transaction.id, "status": transaction.status.to_string()})))
}

#[derive(Debug, Deserialize)]
struct RefundBody {
    reason: String,
    #[serde(default)]
    amount: Option<String>,
}

async fn refund_payment(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<RefundBody>,
) -> Result<Json<Value>, OrchestratorError> {
    let claims = auth::authenticate(&headers, &orchestrator.config.auth.jwt_secret)?;
    auth::require_permission(&claims, permissions::PAYMENT_REFUND)?;
    let amount = body.amount.map(|a| Amount::parse(&a)).transpose()?;
    let transaction = orchestrator.refund(id, &body.reason, amount).await?;
    Ok(Json(json!({"transaction_id": transaction.id, "status": transaction.status.to_string()})))
}

async fn receive_webhook(
    State(orchestrator): State<AppState>,
    Path(provider_tag): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> axum::http::StatusCode {
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_lowercase(), v.to_string())))
        .collect();

    let ack = webhook::handle_webhook(&orchestrator.providers, &orchestrator.store, &provider_tag, &body, &header_map).await;
    match ack {
        WebhookAck::Accepted => axum::http::StatusCode::OK,
        WebhookAck::UnknownProvider => axum::http::StatusCode::NOT_FOUND,
        WebhookAck::BadSignature => axum::http::StatusCode::UNAUTHORIZED,
        WebhookAck::UnknownTransaction => axum::http::StatusCode::OK,
    }
}
