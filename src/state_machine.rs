//! Transaction state machine (spec §4.7, C7).
//!
//! Defines which `(from, to)` pairs are legal and drives every transition
//! through the store's atomic conditional update, so a precondition failure
//! surfaces as [`crate::errors::OrchestratorError::ConcurrentTransition`]
//! rather than silently overwriting a concurrent writer's outcome.

use std::sync::Arc;
use uuid::Uuid;

use crate::errors::OrchestratorError;
use crate::store::{Store, StoreError};
use crate::types::{AuditTrigger, Transaction, TransactionStatus};

/// True if `(from, to)` is one of the transitions spec §4.7 permits.
pub fn is_valid_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
    use TransactionStatus::*;
    matches!(
        (from, to),
        (Initiated, Pending)
            | (Initiated, Failed)
            | (Initiated, Cancelled)
            | (Pending, Processing)
            | (Pending, Confirmed)
            | (Pending, Failed)
            | (Pending, Expired)
            | (Pending, Cancelled)
            | (Processing, Confirmed)
            | (Processing, Failed)
            | (Processing, Expired)
            | (Confirmed, Refunded)
    )
}

/// Applies a transition, rejecting it up front if `(from, to)` is not in the
/// transition table, then delegating the atomic read-verify-write-log to the store.
pub async fn transition(
    store: &Arc<dyn Store>,
    id: Uuid,
    from: TransactionStatus,
    to: TransactionStatus,
    trigger: AuditTrigger,
    detail: Option<String>,
    mutate_extra: impl FnOnce(&mut Transaction) + Send + 'static,
) -> Result<Transaction, OrchestratorError> {
    if !is_valid_transition(from, to) {
        return Err(OrchestratorError::Unknown(format!(
            "illegal transition {from} -> {to}"
        )));
    }
    let result = store
        .transition(
            id,
            from,
            Box::new(move |transaction| {
                transaction.status = to;
                match to {
                    TransactionStatus::Confirmed => transaction.confirmed_at = Some(chrono::Utc::now()),
                    TransactionStatus::Cancelled => transaction.cancelled_at = Some(chrono::Utc::now()),
                    _ => {}
                }
                mutate_extra(transaction);
            }),
            trigger,
            detail,
        )
        .await;

    match result {
        Ok(transaction) => Ok(transaction),
        Err(StoreError::ConcurrentTransition { .. }) => Err(OrchestratorError::ConcurrentTransition),
        Err(StoreError::NotFound(id)) => Err(OrchestratorError::NotFound(id)),
        Err(other) => Err(OrchestratorError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiated_may_only_move_to_pending_or_failed() {
        assert!(is_valid_transition(TransactionStatus::Initiated, TransactionStatus::Pending));
        assert!(is_valid_transition(TransactionStatus::Initiated, TransactionStatus::Failed));
        assert!(!is_valid_transition(TransactionStatus::Initiated, TransactionStatus::Confirmed));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions_except_confirmed_to_refunded() {
        for to in [
            TransactionStatus::Pending,
            TransactionStatus::Processing,
            TransactionStatus::Initiated,
        ] {
            assert!(!is_valid_transition(TransactionStatus::Failed, to));
            assert!(!is_valid_transition(TransactionStatus::Expired, to));
            assert!(!is_valid_transition(TransactionStatus::Cancelled, to));
        }
        assert!(is_valid_transition(TransactionStatus::Confirmed, TransactionStatus::Refunded));
    }
}
