//! Webhook reconciler (spec §4.8, C8).
//!
//! Resolves the inbound callback to an adapter by route, verifies its
//! signature, looks the transaction up by the provider's own id for it, and
//! applies the resulting transition if and only if it is legal and the
//! transaction is not already at the target state.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::provider::{ProviderRegistry, ProviderStatus};
use crate::state_machine;
use crate::store::Store;
use crate::types::{AuditTrigger, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// A valid transition was applied, or one was already at the target status.
    Accepted,
    /// The route did not resolve to a known adapter.
    UnknownProvider,
    /// The signature did not verify; the payload is dropped without error.
    BadSignature,
    /// No matching transaction; likely a different environment's callback.
    UnknownTransaction,
}

fn canonical_to_status(status: ProviderStatus) -> TransactionStatus {
    match status {
        ProviderStatus::Pending => TransactionStatus::Pending,
        ProviderStatus::Processing => TransactionStatus::Processing,
        ProviderStatus::Confirmed => TransactionStatus::Confirmed,
        ProviderStatus::Failed => TransactionStatus::Failed,
    }
}

/// Processes one inbound webhook delivery (spec §4.8 steps 1-6).
pub async fn handle_webhook(
    providers: &ProviderRegistry,
    store: &Arc<dyn Store>,
    provider_tag: &str,
    payload: &[u8],
    headers: &HashMap<String, String>,
) -> WebhookAck {
    let Some(adapter) = providers.by_tag(provider_tag) else {
        warn!(provider_tag, "webhook route did not resolve to a known adapter");
        return WebhookAck::UnknownProvider;
    };

    let Some(event) = adapter.verify_webhook(payload, headers) else {
        warn!(provider_tag, "webhook signature verification failed");
        return WebhookAck::BadSignature;
    };

    let Ok(Some(transaction)) = store.find_by_provider_tx_id(&event.provider_tx_id).await else {
        warn!(provider_tag, provider_tx_id = %event.provider_tx_id, "webhook referenced an unknown transaction");
        return WebhookAck::UnknownTransaction;
    };

    let target = canonical_to_status(event.status);

    if transaction.status == target {
        info!(transaction_id = %transaction.id, "webhook delivery is a no-op, already at target status");
        return WebhookAck::Accepted;
    }

    if transaction.is_terminal() {
        let trigger = if transaction.status == TransactionStatus::Cancelled {
            AuditTrigger::PostCancelConfirmation
        } else {
            AuditTrigger::PostTerminalCallback
        };
        let _ = store
            .log_event(transaction.id, trigger, Some(format!("late webhook reported {target}")))
            .await;
        info!(transaction_id = %transaction.id, "discarding late webhook on terminal transaction");
        return WebhookAck::Accepted;
    }

    if !state_machine::is_valid_transition(transaction.status, target) {
        warn!(
            transaction_id = %transaction.id,
            from = %transaction.status,
            to = %target,
            "webhook requested an illegal transition, discarding"
        );
        return WebhookAck::Accepted;
    }

    let provider_reference = event.provider_reference.clone();
    let result = state_machine::transition(
        store,
        transaction.id,
        transaction.status,
        target,
        AuditTrigger::Webhook,
        None,
        move |t| {
            if let Some(reference) = provider_reference {
                t.provider_reference = Some(reference);
            }
            if target == TransactionStatus::Failed {
                t.failure_reason = Some("provider reported failure via webhook".to_string());
            }
        },
    )
    .await;

    match result {
        Ok(_) => WebhookAck::Accepted,
        Err(err) => {
            // The same transaction may have moved concurrently; the other
            // writer's transition already won, so this is not a caller-visible error.
            info!(transaction_id = %transaction.id, error = %err, "webhook transition lost the race, already applied");
            WebhookAck::Accepted
        }
    }
}
