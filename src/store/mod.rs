//! Transaction storage contract and its in-memory implementation (spec §6.4).
//!
//! `Store` is the seam: everything above this module only knows about
//! conditional updates keyed on current status, never about the backing
//! storage engine. Mirrors how the teacher hides RPC transport behind
//! `ChainProvider` — a SQL-backed `Store` could be substituted without
//! touching the orchestrator, selector or webhook reconciler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::types::{Attempt, AuditEvent, AuditTrigger, Transaction, TransactionStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),
    #[error("expected status {expected}, found {actual}")]
    ConcurrentTransition {
        expected: TransactionStatus,
        actual: TransactionStatus,
    },
    #[error("idempotency key already exists with a different request fingerprint")]
    IdempotencyConflict,
    #[error("a request with this idempotency key is already in flight")]
    IdempotencyInFlight { transaction_id: Uuid },
}

/// The durable transaction store contract.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert(&self, transaction: Transaction) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Transaction, StoreError>;

    /// Applies a transition to `to_status` only if the transaction currently
    /// has status `expected_from`, appending `event` atomically with it
    /// (spec §4.7: read, verify, write, log, all as one store operation).
    async fn transition(
        &self,
        id: Uuid,
        expected_from: TransactionStatus,
        mutate: Box<dyn FnOnce(&mut Transaction) + Send>,
        trigger: AuditTrigger,
        detail: Option<String>,
    ) -> Result<Transaction, StoreError>;

    /// Mutates fields on a transaction without changing its status and without
    /// appending an audit event, for bookkeeping updates that aren't themselves
    /// a status transition (e.g. recording a provider reference while still
    /// pending, or incrementing a retry counter).
    async fn update_fields(
        &self,
        id: Uuid,
        mutate: Box<dyn FnOnce(&mut Transaction) + Send>,
    ) -> Result<Transaction, StoreError>;

    /// Finds a transaction by the provider's own id for it, used by the webhook reconciler.
    async fn find_by_provider_tx_id(&self, provider_tx_id: &str) -> Result<Option<Transaction>, StoreError>;

    /// Appends an audit-only event without changing status, for late callbacks
    /// on an already-terminal transaction (spec S6: `post_terminal_callback`,
    /// `post_cancel_confirmation`).
    async fn log_event(&self, id: Uuid, trigger: AuditTrigger, detail: Option<String>) -> Result<(), StoreError>;

    /// Appends one provider-attempt record to `Transaction::attempts` (spec §4.6:
    /// "a retry attempt is recorded on the transaction").
    async fn record_attempt(&self, id: Uuid, attempt: Attempt) -> Result<(), StoreError>;

    async fn audit_log(&self, id: Uuid) -> Result<Vec<AuditEvent>, StoreError>;

    /// Returns ids of non-terminal transactions whose `expires_at` has passed, for the sweeper.
    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>, StoreError>;
}

struct Record {
    transaction: Transaction,
    events: Vec<AuditEvent>,
    next_sequence: u64,
}

/// `dashmap`-backed store. Adequate for single-process deployment; a
/// multi-instance deployment would substitute a SQL-backed `Store` here.
pub struct InMemoryStore {
    records: DashMap<Uuid, Mutex<Record>>,
    by_provider_tx_id: DashMap<String, Uuid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_provider_tx_id: DashMap::new(),
        }
    }

    fn index_provider_tx_ids(&self, transaction: &Transaction) {
        if let Some(reference) = &transaction.provider_reference {
            self.by_provider_tx_id.insert(reference.clone(), transaction.id);
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(&self, transaction: Transaction) -> Result<(), StoreError> {
        self.index_provider_tx_ids(&transaction);
        let id = transaction.id;
        self.records.insert(
            id,
            Mutex::new(Record {
                transaction,
                events: Vec::new(),
                next_sequence: 1,
            }),
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Transaction, StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let guard = record.lock().expect("store mutex poisoned");
        Ok(guard.transaction.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_from: TransactionStatus,
        mutate: Box<dyn FnOnce(&mut Transaction) + Send>,
        trigger: AuditTrigger,
        detail: Option<String>,
    ) -> Result<Transaction, StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let mut guard = record.lock().expect("store mutex poisoned");

        if guard.transaction.status != expected_from {
            return Err(StoreError::ConcurrentTransition {
                expected: expected_from,
                actual: guard.transaction.status,
            });
        }

        let from_status = guard.transaction.status;
        mutate(&mut guard.transaction);
        guard.transaction.updated_at = Utc::now();
        let to_status = guard.transaction.status;

        let sequence = guard.next_sequence;
        guard.next_sequence += 1;
        guard.events.push(AuditEvent {
            transaction_id: id,
            sequence,
            from_status: Some(from_status),
            to_status,
            trigger,
            recorded_at: Utc::now(),
            detail,
        });

        let snapshot = guard.transaction.clone();
        drop(guard);
        self.index_provider_tx_ids(&snapshot);
        Ok(snapshot)
    }

    async fn update_fields(
        &self,
        id: Uuid,
        mutate: Box<dyn FnOnce(&mut Transaction) + Send>,
    ) -> Result<Transaction, StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let mut guard = record.lock().expect("store mutex poisoned");
        mutate(&mut guard.transaction);
        guard.transaction.updated_at = Utc::now();
        let snapshot = guard.transaction.clone();
        drop(guard);
        self.index_provider_tx_ids(&snapshot);
        Ok(snapshot)
    }

    async fn find_by_provider_tx_id(&self, provider_tx_id: &str) -> Result<Option<Transaction>, StoreError> {
        let Some(id) = self.by_provider_tx_id.get(provider_tx_id).map(|e| *e) else {
            return Ok(None);
        };
        match self.get(id).await {
            Ok(transaction) => Ok(Some(transaction)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn log_event(&self, id: Uuid, trigger: AuditTrigger, detail: Option<String>) -> Result<(), StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let mut guard = record.lock().expect("store mutex poisoned");
        let status = guard.transaction.status;
        let sequence = guard.next_sequence;
        guard.next_sequence += 1;
        guard.events.push(AuditEvent {
            transaction_id: id,
            sequence,
            from_status: Some(status),
            to_status: status,
            trigger,
            recorded_at: Utc::now(),
            detail,
        });
        Ok(())
    }

    async fn audit_log(&self, id: Uuid) -> Result<Vec<AuditEvent>, StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let guard = record.lock().expect("store mutex poisoned");
        Ok(guard.events.clone())
    }

    async fn record_attempt(&self, id: Uuid, attempt: Attempt) -> Result<(), StoreError> {
        let record = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let mut guard = record.lock().expect("store mutex poisoned");
        guard.transaction.attempts.push(attempt);
        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>, StoreError> {
        let mut expired = Vec::new();
        for entry in self.records.iter() {
            if expired.len() >= limit {
                break;
            }
            let guard = entry.value().lock().expect("store mutex poisoned");
            let transaction = &guard.transaction;
            if !transaction.is_terminal() && transaction.expires_at <= now {
                expired.push(transaction.id);
            }
        }
        Ok(expired)
    }
}
