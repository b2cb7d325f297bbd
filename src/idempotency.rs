//! Idempotency key store (spec §4.3, C4).
//!
//! Guards `POST /payments` against duplicate submission: concurrent callers
//! presenting the same `Idempotency-Key` race to create exactly one
//! transaction, keyed by a conditional insert on a `dashmap` entry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RecordState {
    Processing,
    Completed,
    Failed,
}

struct Record {
    request_hash: String,
    state: RecordState,
    transaction_id: Uuid,
    response: Option<Value>,
    started_at: DateTime<Utc>,
    attempt_count: u32,
    expires_at: DateTime<Utc>,
}

/// Outcome of presenting an idempotency key to [`IdempotencyStore::begin`].
pub enum BeginOutcome {
    /// No prior record: the caller proceeds and owns this key.
    Fresh,
    /// Another in-flight request already owns this key with the same request body.
    InProgress { transaction_id: Uuid },
    /// A prior call with this key and the same request body has already finished.
    Completed { response: Value },
    /// This key was already used with a materially different request body.
    Conflict,
    /// The prior owner exceeded its processing budget; this caller may take over.
    TimedOutRestarted,
}

/// Canonicalises a JSON request body into the hash compared across retries of the same key.
pub fn request_hash(body: &Value) -> String {
    let canonical = serde_json::to_vec(body).expect("json values always serialize");
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

pub struct IdempotencyStore {
    records: DashMap<String, Mutex<Record>>,
    ttl: chrono::Duration,
    processing_timeout: chrono::Duration,
}

impl IdempotencyStore {
    pub fn new(ttl_seconds: i64, processing_timeout_seconds: i64) -> Self {
        Self {
            records: DashMap::new(),
            ttl: chrono::Duration::seconds(ttl_seconds),
            processing_timeout: chrono::Duration::seconds(processing_timeout_seconds),
        }
    }

    /// Atomically begins processing under `key`, creating a fresh record if
    /// and only if none exists yet (spec: "at most one call observes fresh").
    pub fn begin(&self, key: &str, hash: &str, transaction_id: Uuid) -> BeginOutcome {
        let now = Utc::now();
        let mut created_fresh = false;
        let entry = self.records.entry(key.to_string()).or_insert_with(|| {
            created_fresh = true;
            Mutex::new(Record {
                request_hash: hash.to_string(),
                state: RecordState::Processing,
                transaction_id,
                response: None,
                started_at: now,
                attempt_count: 1,
                expires_at: now + self.ttl,
            })
        });
        if created_fresh {
            return BeginOutcome::Fresh;
        }

        let mut record = entry.lock().expect("idempotency mutex poisoned");
        if record.request_hash != hash {
            return BeginOutcome::Conflict;
        }
        match record.state {
            RecordState::Completed | RecordState::Failed => BeginOutcome::Completed {
                response: record.response.clone().unwrap_or(Value::Null),
            },
            RecordState::Processing => {
                if now - record.started_at > self.processing_timeout {
                    record.started_at = now;
                    record.attempt_count += 1;
                    record.transaction_id = transaction_id;
                    BeginOutcome::TimedOutRestarted
                } else {
                    BeginOutcome::InProgress {
                        transaction_id: record.transaction_id,
                    }
                }
            }
        }
    }

    pub fn complete(&self, key: &str, response: Value) {
        if let Some(entry) = self.records.get(key) {
            let mut record = entry.lock().expect("idempotency mutex poisoned");
            record.state = RecordState::Completed;
            record.response = Some(response);
        }
    }

    pub fn fail(&self, key: &str, response: Value) {
        if let Some(entry) = self.records.get(key) {
            let mut record = entry.lock().expect("idempotency mutex poisoned");
            record.state = RecordState::Failed;
            record.response = Some(response);
        }
    }

    /// Drops records past their TTL; run from the same sweeper loop as the
    /// transaction-expiry sweep, on a longer period.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        self.records.retain(|_, record| {
            let record = record.lock().expect("idempotency mutex poisoned");
            record.expires_at > now
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_caller_observes_fresh_concurrent_callers_observe_in_progress() {
        let store = IdempotencyStore::new(86_400, 30);
        let hash = request_hash(&json!({"amount": "10.00"}));
        let tx1 = Uuid::new_v4();
        let tx2 = Uuid::new_v4();
        assert!(matches!(store.begin("key1", &hash, tx1), BeginOutcome::Fresh));
        assert!(matches!(
            store.begin("key1", &hash, tx2),
            BeginOutcome::InProgress { transaction_id } if transaction_id == tx1
        ));
    }

    #[test]
    fn same_key_different_body_is_a_conflict() {
        let store = IdempotencyStore::new(86_400, 30);
        let hash_a = request_hash(&json!({"amount": "10.00"}));
        let hash_b = request_hash(&json!({"amount": "20.00"}));
        store.begin("key2", &hash_a, Uuid::new_v4());
        assert!(matches!(store.begin("key2", &hash_b, Uuid::new_v4()), BeginOutcome::Conflict));
    }

    #[test]
    fn completed_record_replays_the_stored_response() {
        let store = IdempotencyStore::new(86_400, 30);
        let hash = request_hash(&json!({"amount": "10.00"}));
        let tx = Uuid::new_v4();
        store.begin("key3", &hash, tx);
        store.complete("key3", json!({"transaction_id": tx.to_string(), "status": "pending"}));
        match store.begin("key3", &hash, Uuid::new_v4()) {
            BeginOutcome::Completed { response } => assert_eq!(response["status"], "pending"),
            _ => panic!("expected Completed"),
        }
    }
}
