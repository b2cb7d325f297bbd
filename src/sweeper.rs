//! Background expiry sweeper (spec §5 "Timeouts", A5).
//!
//! Moves timed-out `pending`/`processing` transactions to `expired` on a
//! configurable interval, and separately sweeps idempotency records past
//! their TTL on the same loop, per spec §4.3.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::idempotency::IdempotencyStore;
use crate::state_machine;
use crate::store::Store;
use crate::types::{AuditTrigger, TransactionStatus};

const EXPIRED_BATCH_LIMIT: usize = 256;
const IDEMPOTENCY_SWEEP_EVERY_N_TICKS: u32 = 10;

/// Runs until `cancellation_token` fires, polling every `interval` for
/// expired transactions.
pub async fn run(
    store: Arc<dyn Store>,
    idempotency: Arc<IdempotencyStore>,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut ticks: u32 = 0;
    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                sweep_expired_transactions(&store).await;
                ticks = ticks.wrapping_add(1);
                if ticks % IDEMPOTENCY_SWEEP_EVERY_N_TICKS == 0 {
                    idempotency.sweep_expired();
                }
            }
        }
    }
}

async fn sweep_expired_transactions(store: &Arc<dyn Store>) {
    let now = Utc::now();
    let expired = match store.find_expired(now, EXPIRED_BATCH_LIMIT).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(error = %err, "failed to scan for expired transactions");
            return;
        }
    };

    for id in expired {
        let Ok(transaction) = store.get(id).await else { continue };
        if transaction.is_terminal() {
            continue;
        }
        let result = state_machine::transition(
            store,
            id,
            transaction.status,
            TransactionStatus::Expired,
            AuditTrigger::Sweeper,
            Some("expires_at passed with no terminal webhook".to_string()),
            |_| {},
        )
        .await;
        if let Err(err) = result {
            // A concurrent webhook or cancellation may have already moved it; not an error.
            info!(transaction_id = %id, error = %err, "sweeper lost the race on this transaction");
        }
    }
}
