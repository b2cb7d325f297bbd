//! The orchestrator core (spec §4.1, C9).
//!
//! Threads every submission through rate limiting, idempotency, fraud
//! scoring, provider selection, and the retry/failover engine exactly once,
//! wiring C1 through C8 together the way the teacher's facilitator wires its
//! scheme clients and chain providers behind one request path.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::breaker::{BreakerRegistry, CallOutcome};
use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::fraud::{FraudFeatures, FraudScorer};
use crate::idempotency::{request_hash, BeginOutcome, IdempotencyStore};
use crate::provider::{AdapterError, InitiateRequest, ProviderRegistry, ProviderStatus};
use crate::rate_limiter::RateLimiter;
use crate::retry::{classify, RetryConfig, RetryDecision};
use crate::selector;
use crate::state_machine;
use crate::store::Store;
use crate::types::{
    Attempt, AttemptOutcome, AuditTrigger, Phone, RiskLevel, Transaction, TransactionStatus, TransactionType, UserId,
};
use crate::util::money_amount::Amount;

pub struct PaymentRequest {
    pub user_id: String,
    pub amount: String,
    pub recipient_phone: String,
    pub recipient_name: String,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

/// The wiring a single orchestrator instance holds for the lifetime of the process.
pub struct Orchestrator {
    pub store: Arc<dyn Store>,
    pub providers: ProviderRegistry,
    pub breakers: BreakerRegistry,
    pub rate_limiter: RateLimiter,
    pub idempotency: Arc<IdempotencyStore>,
    pub fraud_scorer: Arc<dyn FraudScorer>,
    pub config: Config,
}

impl Orchestrator {
    /// Drives the full happy/unhappy path of spec §4.1 steps 1-11.
    pub async fn initiate_payment(&self, request: PaymentRequest) -> Result<Value, OrchestratorError> {
        let user_id = UserId::parse(request.user_id.trim())?;
        let amount = Amount::parse(&request.amount)?;
        let phone = Phone::canonicalise(&request.recipient_phone)?;
        let recipient_name = request.recipient_name.trim().to_string();

        let min = Amount::parse(&self.config.transaction.min_amount)?;
        let max = Amount::parse(&self.config.transaction.max_amount)?;
        if !amount.is_between(min, max) {
            return Err(OrchestratorError::Validation(format!(
                "amount must be between {min} and {max}"
            )));
        }

        let rate_limit_config = self.config.rate_limit_for("payments_initiate");
        let decision = self.rate_limiter.check(user_id.as_str(), "payments_initiate", &rate_limit_config);
        if !decision.allowed {
            return Err(OrchestratorError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds.unwrap_or(60),
            });
        }

        let body_for_hash = json!({
            "user_id": user_id.as_str(),
            "amount": amount.to_string(),
            "recipient_phone": phone.as_str(),
            "recipient_name": recipient_name,
            "description": request.description,
        });
        let hash = request_hash(&body_for_hash);
        let candidate_id = Uuid::new_v4();

        let idempotency_key = match &request.idempotency_key {
            Some(key) => key.clone(),
            None => candidate_id.to_string(),
        };

        match self.idempotency.begin(&idempotency_key, &hash, candidate_id) {
            BeginOutcome::Completed { response } => return Ok(response),
            BeginOutcome::InProgress { transaction_id } => {
                return Err(OrchestratorError::DuplicateInFlight { transaction_id })
            }
            BeginOutcome::Conflict => return Err(OrchestratorError::IdempotencyConflict),
            BeginOutcome::Fresh | BeginOutcome::TimedOutRestarted => {}
        }

        let result = self
            .initiate_payment_inner(candidate_id, user_id, amount, phone, recipient_name, request.description)
            .await;

        match &result {
            Ok(response) => self.idempotency.complete(&idempotency_key, response.clone()),
            Err(err) => self.idempotency.fail(&idempotency_key, json!({"error": err.to_string()})),
        }
        result
    }

    async fn initiate_payment_inner(
        &self,
        id: Uuid,
        user_id: UserId,
        amount: Amount,
        phone: Phone,
        recipient_name: String,
        description: Option<String>,
    ) -> Result<Value, OrchestratorError> {
        let verdict = self
            .fraud_scorer
            .score(&FraudFeatures {
                user_id: &user_id,
                amount,
                recipient_phone_digits: phone.digits(),
                user_transaction_count_24h: 0,
                user_failed_count_24h: 0,
            })
            .await;

        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.config.transaction.timeout_seconds);

        let base_transaction = Transaction {
            id,
            external_reference: id.to_string(),
            user_id: user_id.clone(),
            amount,
            currency: "GHS".to_string(),
            recipient_phone: phone.clone(),
            recipient_name,
            transaction_type: TransactionType::Payment,
            status: TransactionStatus::Initiated,
            primary_provider: None,
            provider_reference: None,
            risk_score: verdict.risk_score,
            risk_level: verdict.risk_level,
            retry_count: 0,
            max_retries: self.config.transaction.max_retries,
            created_at: now,
            updated_at: now,
            expires_at,
            confirmed_at: None,
            cancelled_at: None,
            attempts: Vec::new(),
            cross_network: false,
            failure_reason: None,
            failure_error_code: None,
            refund_of: None,
        };

        if verdict.is_fraud && verdict.risk_level == RiskLevel::Critical {
            let mut transaction = base_transaction;
            transaction.status = TransactionStatus::Failed;
            transaction.failure_reason = Some("fraud_blocked".to_string());
            self.store.insert(transaction.clone()).await.map_err(store_err)?;
            self.store
                .log_event(id, AuditTrigger::Orchestrator, Some("fraud_blocked".to_string()))
                .await
                .map_err(store_err)?;
            return Err(OrchestratorError::FraudBlocked);
        }

        if verdict.is_fraud && verdict.risk_level == RiskLevel::High {
            let mut transaction = base_transaction;
            transaction.status = TransactionStatus::Failed;
            transaction.failure_reason = Some("fraud_requires_verification".to_string());
            self.store.insert(transaction.clone()).await.map_err(store_err)?;
            return Err(OrchestratorError::FraudRequiresVerification);
        }

        self.store.insert(base_transaction).await.map_err(store_err)?;

        let selection = selector::select(&self.providers, &self.breakers, phone.digits(), amount)?;

        let transaction = state_machine::transition(
            &self.store,
            id,
            TransactionStatus::Initiated,
            TransactionStatus::Pending,
            AuditTrigger::Orchestrator,
            None,
            {
                let primary = selection.ordered_tags.first().cloned();
                let cross_network = selection.cross_network;
                move |t| {
                    t.primary_provider = primary;
                    t.cross_network = cross_network;
                }
            },
        )
        .await?;

        let dispatch_result = self.dispatch(&transaction, &selection.ordered_tags, amount, description).await;

        let response = match dispatch_result {
            Ok((status, provider_reference)) => {
                let detail = None;
                if status == TransactionStatus::Confirmed {
                    state_machine::transition(
                        &self.store,
                        id,
                        TransactionStatus::Pending,
                        TransactionStatus::Confirmed,
                        AuditTrigger::Orchestrator,
                        detail,
                        move |t| t.provider_reference = provider_reference.clone(),
                    )
                    .await?;
                } else {
                    self.store
                        .update_fields(id, Box::new(move |t| t.provider_reference = provider_reference.clone()))
                        .await
                        .map_err(store_err)?;
                }
                json!({"transaction_id": id, "status": status.to_string()})
            }
            Err(err) => {
                state_machine::transition(
                    &self.store,
                    id,
                    TransactionStatus::Pending,
                    TransactionStatus::Failed,
                    AuditTrigger::Orchestrator,
                    Some(err.to_string()),
                    move |t| t.failure_reason = Some(err.to_string()),
                )
                .await?;
                return Err(err);
            }
        };

        Ok(response)
    }

    /// Runs C6's ordered provider list through C5(C2(C1)): retry within a
    /// provider, fail over to the next on exhaustion, probing `status()`
    /// first whenever an attempt's outcome is ambiguous.
    async fn dispatch(
        &self,
        transaction: &Transaction,
        ordered_tags: &[String],
        amount: Amount,
        description: Option<String>,
    ) -> Result<(TransactionStatus, Option<String>), OrchestratorError> {
        let mut last_error = OrchestratorError::NoEligibleProvider;

        for tag in ordered_tags {
            let Some(adapter) = self.providers.by_tag(tag) else { continue };
            let retry_config = self
                .config
                .providers
                .iter()
                .find(|p| &p.tag == tag)
                .map(|p| p.retry)
                .unwrap_or_default();

            let mut attempt: u32 = 0;
            loop {
                if self.breakers.admit(tag).is_err() {
                    last_error = OrchestratorError::CircuitOpen {
                        provider_tag: tag.clone(),
                    };
                    break;
                }

                let _ = self
                    .store
                    .update_fields(transaction.id, Box::new(|t| t.retry_count += 1))
                    .await;

                let started_at = Instant::now();
                let request = InitiateRequest {
                    transaction_id: transaction.id,
                    amount,
                    recipient_phone: transaction.recipient_phone.as_str().to_string(),
                    recipient_name: transaction.recipient_name.clone(),
                    description: description.clone(),
                };
                let outcome = adapter.initiate(&request).await;
                let duration = started_at.elapsed();
                let attempt_started_at = Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default();

                match outcome {
                    Ok(response) => {
                        self.breakers.record(tag, CallOutcome::Success, duration);
                        let _ = self
                            .store
                            .record_attempt(
                                transaction.id,
                                Attempt {
                                    provider_tag: tag.clone(),
                                    started_at: attempt_started_at,
                                    ended_at: Some(Utc::now()),
                                    outcome: AttemptOutcome::Success,
                                    error_code: None,
                                },
                            )
                            .await;
                        let status = match response.status {
                            ProviderStatus::Confirmed => TransactionStatus::Confirmed,
                            _ => TransactionStatus::Pending,
                        };
                        return Ok((status, response.provider_reference.or(Some(response.provider_tx_id))));
                    }
                    Err(AdapterError::AmbiguousTimeout { provider_tx_id }) => {
                        self.breakers.record(tag, CallOutcome::Failure, duration);
                        match adapter.status(&provider_tx_id).await {
                            Ok(response) if response.status == ProviderStatus::Confirmed => {
                                info!(tag, provider_tx_id, "status probe found the payment already confirmed");
                                let _ = self
                                    .store
                                    .record_attempt(
                                        transaction.id,
                                        Attempt {
                                            provider_tag: tag.clone(),
                                            started_at: attempt_started_at,
                                            ended_at: Some(Utc::now()),
                                            outcome: AttemptOutcome::ConfirmedAfterStatusProbe,
                                            error_code: None,
                                        },
                                    )
                                    .await;
                                return Ok((TransactionStatus::Confirmed, response.provider_reference));
                            }
                            Ok(response) if response.status == ProviderStatus::Failed => {
                                last_error = OrchestratorError::ProviderTransient(
                                    "provider confirmed failure on status probe".to_string(),
                                );
                                break;
                            }
                            _ => {
                                warn!(tag, provider_tx_id, "status probe inconclusive, suppressing retry");
                                last_error = OrchestratorError::ProviderTransient(
                                    "timed out with unknown outcome".to_string(),
                                );
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        self.breakers.record(tag, CallOutcome::Failure, duration);
                        let decision = classify(&err, attempt, &retry_config);
                        last_error = adapter_error_to_orchestrator_error(&err, tag);
                        let attempt_outcome = match decision {
                            RetryDecision::RetrySameProvider => AttemptOutcome::Retryable,
                            RetryDecision::FailoverToNextProvider | RetryDecision::GiveUp => AttemptOutcome::NonRetryable,
                            RetryDecision::ProbeStatusFirst => AttemptOutcome::Retryable,
                            RetryDecision::RetryAfter(_) => AttemptOutcome::NonRetryable,
                        };
                        let _ = self
                            .store
                            .record_attempt(
                                transaction.id,
                                Attempt {
                                    provider_tag: tag.clone(),
                                    started_at: attempt_started_at,
                                    ended_at: Some(Utc::now()),
                                    outcome: attempt_outcome,
                                    error_code: Some(last_error.to_string()),
                                },
                            )
                            .await;
                        match decision {
                            RetryDecision::RetrySameProvider => {
                                tokio::time::sleep(retry_config.backoff_for(attempt)).await;
                                attempt += 1;
                                continue;
                            }
                            RetryDecision::FailoverToNextProvider | RetryDecision::GiveUp => break,
                            RetryDecision::ProbeStatusFirst => break,
                            RetryDecision::RetryAfter(_) => break,
                        }
                    }
                }
            }
        }

        Err(last_error)
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, OrchestratorError> {
        self.store.get(id).await.map_err(store_err)
    }

    /// Validates ownership, then transitions a cancellable transaction to `cancelled`.
    pub async fn cancel(&self, id: Uuid, user_id: &str) -> Result<Transaction, OrchestratorError> {
        let transaction = self.store.get(id).await.map_err(store_err)?;
        if transaction.user_id.as_str() != user_id {
            return Err(OrchestratorError::NotFound(id));
        }
        if !matches!(transaction.status, TransactionStatus::Initiated | TransactionStatus::Pending) {
            return Err(OrchestratorError::ConcurrentTransition);
        }
        state_machine::transition(
            &self.store,
            id,
            transaction.status,
            TransactionStatus::Cancelled,
            AuditTrigger::Cancellation,
            None,
            |_| {},
        )
        .await
    }

    /// Creates a new refund transaction against a confirmed original, per spec §4.1 step "refund".
    pub async fn refund(&self, id: Uuid, reason: &str, amount: Option<Amount>) -> Result<Transaction, OrchestratorError> {
        let original = self.store.get(id).await.map_err(store_err)?;
        if original.status != TransactionStatus::Confirmed {
            return Err(OrchestratorError::Validation(
                "refund is only valid against a confirmed transaction".to_string(),
            ));
        }
        let refund_amount = amount.unwrap_or(original.amount);
        let Some(primary) = &original.primary_provider else {
            return Err(OrchestratorError::NoEligibleProvider);
        };
        let adapter = self
            .providers
            .by_tag(primary)
            .ok_or(OrchestratorError::NoEligibleProvider)?;
        let original_provider_tx_id = original
            .provider_reference
            .clone()
            .ok_or(OrchestratorError::Validation("original transaction has no provider reference".to_string()))?;

        let refund_id = Uuid::new_v4();
        let now = Utc::now();
        let refund_transaction = Transaction {
            id: refund_id,
            external_reference: refund_id.to_string(),
            user_id: original.user_id.clone(),
            amount: refund_amount,
            currency: original.currency.clone(),
            recipient_phone: original.recipient_phone.clone(),
            recipient_name: original.recipient_name.clone(),
            transaction_type: TransactionType::Refund,
            status: TransactionStatus::Initiated,
            primary_provider: Some(primary.clone()),
            provider_reference: None,
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            retry_count: 0,
            max_retries: original.max_retries,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::seconds(self.config.transaction.timeout_seconds),
            confirmed_at: None,
            cancelled_at: None,
            attempts: Vec::new(),
            cross_network: false,
            failure_reason: None,
            failure_error_code: None,
            refund_of: Some(id),
        };
        self.store.insert(refund_transaction).await.map_err(store_err)?;

        let provider_refund_reference = adapter
            .refund(&original_provider_tx_id, refund_amount, reason)
            .await
            .map_err(|e| adapter_error_to_orchestrator_error(&e, primary))?;

        state_machine::transition(
            &self.store,
            refund_id,
            TransactionStatus::Initiated,
            TransactionStatus::Pending,
            AuditTrigger::Orchestrator,
            None,
            move |t| t.provider_reference = Some(provider_refund_reference.clone()),
        )
        .await?;

        let refund_transaction = state_machine::transition(
            &self.store,
            refund_id,
            TransactionStatus::Pending,
            TransactionStatus::Confirmed,
            AuditTrigger::Orchestrator,
            None,
            |_| {},
        )
        .await?;

        state_machine::transition(
            &self.store,
            id,
            TransactionStatus::Confirmed,
            TransactionStatus::Refunded,
            AuditTrigger::Orchestrator,
            Some(reason.to_string()),
            |_| {},
        )
        .await?;

        Ok(refund_transaction)
    }
}

fn adapter_error_to_orchestrator_error(error: &AdapterError, provider_tag: &str) -> OrchestratorError {
    match error {
        AdapterError::Transient(message) => OrchestratorError::ProviderTransient(message.clone()),
        AdapterError::Permanent(message) => OrchestratorError::ProviderPermanent(message.clone()),
        AdapterError::RateLimited => OrchestratorError::ProviderRateLimited {
            provider_tag: provider_tag.to_string(),
            retry_after_seconds: 1,
        },
        AdapterError::AmbiguousTimeout { .. } => {
            OrchestratorError::ProviderTransient("ambiguous timeout".to_string())
        }
    }
}

fn store_err(error: crate::store::StoreError) -> OrchestratorError {
    match error {
        crate::store::StoreError::NotFound(id) => OrchestratorError::NotFound(id),
        crate::store::StoreError::ConcurrentTransition { .. } => OrchestratorError::ConcurrentTransition,
        crate::store::StoreError::IdempotencyConflict => OrchestratorError::IdempotencyConflict,
        crate::store::StoreError::IdempotencyInFlight { transaction_id } => {
            OrchestratorError::DuplicateInFlight { transaction_id }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraud::ThresholdScorer;
    use crate::idempotency::IdempotencyStore;
    use crate::provider::{ProviderLimits, ProviderRegistry, WebhookEvent};
    use crate::rate_limiter::RateLimiter;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;

    /// A scripted provider standing in for a real network in tests. `behavior`
    /// decides what the single configured `tag` does on `initiate`.
    struct FakeAdapter {
        tag: &'static str,
        behavior: FakeBehavior,
    }

    enum FakeBehavior {
        ConfirmsSynchronously,
        AcceptsThenAwaitsConfirmation,
    }

    impl FakeAdapter {
        fn new(tag: &'static str, behavior: FakeBehavior) -> Self {
            Self { tag, behavior }
        }
    }

    #[async_trait]
    impl crate::provider::ProviderAdapter for FakeAdapter {
        fn provider_tag(&self) -> &str {
            self.tag
        }

        fn supports_phone(&self, _phone_digits: &str) -> bool {
            true
        }

        fn limits(&self) -> ProviderLimits {
            ProviderLimits {
                min: Amount::parse("1.00").unwrap(),
                max: Amount::parse("5000.00").unwrap(),
                daily: Amount::parse("20000.00").unwrap(),
            }
        }

        async fn authenticate(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn initiate(&self, _request: &InitiateRequest) -> Result<crate::provider::ProviderResponse, AdapterError> {
            match self.behavior {
                FakeBehavior::ConfirmsSynchronously => Ok(crate::provider::ProviderResponse {
                    provider_tx_id: "ptx-1".to_string(),
                    provider_reference: Some("pref-1".to_string()),
                    status: ProviderStatus::Confirmed,
                    message: None,
                }),
                FakeBehavior::AcceptsThenAwaitsConfirmation => Ok(crate::provider::ProviderResponse {
                    provider_tx_id: "ptx-2".to_string(),
                    provider_reference: None,
                    status: ProviderStatus::Pending,
                    message: None,
                }),
            }
        }

        async fn status(&self, provider_tx_id: &str) -> Result<crate::provider::ProviderResponse, AdapterError> {
            Ok(crate::provider::ProviderResponse {
                provider_tx_id: provider_tx_id.to_string(),
                provider_reference: None,
                status: ProviderStatus::Pending,
                message: None,
            })
        }

        async fn refund(&self, _original_provider_tx_id: &str, _amount: Amount, _reason: &str) -> Result<String, AdapterError> {
            Ok("refund-ref".to_string())
        }

        fn verify_webhook(&self, _payload: &[u8], _headers: &StdHashMap<String, String>) -> Option<WebhookEvent> {
            None
        }

        fn map_status(&self, _provider_status: &str) -> ProviderStatus {
            ProviderStatus::Pending
        }
    }

    fn test_config() -> Config {
        let raw = serde_json::json!({
            "providers": [
                {
                    "tag": "fake",
                    "limits": {"min": "1.00", "max": "5000.00", "daily": "20000.00"},
                    "priority": 1
                }
            ]
        });
        serde_json::from_value(raw).expect("valid test config")
    }

    fn test_orchestrator(adapter: Arc<dyn crate::provider::ProviderAdapter>) -> Orchestrator {
        let config = test_config();
        Orchestrator {
            store: Arc::new(InMemoryStore::new()),
            providers: ProviderRegistry::new(vec![adapter]),
            breakers: BreakerRegistry::new(vec![("fake".to_string(), crate::breaker::BreakerConfig::default())]),
            rate_limiter: RateLimiter::new(),
            idempotency: Arc::new(IdempotencyStore::new(86_400, 30)),
            fraud_scorer: Arc::new(ThresholdScorer::default()),
            config,
        }
    }

    fn payment_request(amount: &str) -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".to_string(),
            amount: amount.to_string(),
            recipient_phone: "233241234567".to_string(),
            recipient_name: "Ama".to_string(),
            description: None,
            idempotency_key: None,
        }
    }

    /// Spec scenario S1: a provider that confirms synchronously takes the
    /// transaction straight to `confirmed` with exactly two audit entries.
    #[tokio::test]
    async fn synchronous_confirmation_produces_two_audit_entries() {
        let adapter = Arc::new(FakeAdapter::new("fake", FakeBehavior::ConfirmsSynchronously));
        let orchestrator = test_orchestrator(adapter);

        let response = orchestrator.initiate_payment(payment_request("100.00")).await.unwrap();
        let id: Uuid = response["transaction_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(response["status"], "confirmed");

        let transaction = orchestrator.get_transaction(id).await.unwrap();
        assert_eq!(transaction.status, TransactionStatus::Confirmed);

        let audit_log = orchestrator.store.audit_log(id).await.unwrap();
        assert_eq!(audit_log.len(), 2, "expected initiated->pending and pending->confirmed only");
        assert_eq!(audit_log[0].from_status, Some(TransactionStatus::Initiated));
        assert_eq!(audit_log[0].to_status, TransactionStatus::Pending);
        assert_eq!(audit_log[1].from_status, Some(TransactionStatus::Pending));
        assert_eq!(audit_log[1].to_status, TransactionStatus::Confirmed);
    }

    /// Spec scenario S2: a provider that accepts but hasn't confirmed leaves
    /// the transaction `pending`, recording the provider reference without
    /// appending a spurious self-loop audit entry.
    #[tokio::test]
    async fn accepted_but_unconfirmed_stays_pending_with_one_audit_entry() {
        let adapter = Arc::new(FakeAdapter::new("fake", FakeBehavior::AcceptsThenAwaitsConfirmation));
        let orchestrator = test_orchestrator(adapter);

        let response = orchestrator.initiate_payment(payment_request("100.00")).await.unwrap();
        let id: Uuid = response["transaction_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(response["status"], "pending");

        let transaction = orchestrator.get_transaction(id).await.unwrap();
        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert_eq!(transaction.provider_reference, Some("ptx-2".to_string()));

        let audit_log = orchestrator.store.audit_log(id).await.unwrap();
        assert_eq!(audit_log.len(), 1, "the provider-reference update must not append a second audit event");
    }

    #[tokio::test]
    async fn retry_count_is_incremented_per_dispatch_attempt() {
        let adapter = Arc::new(FakeAdapter::new("fake", FakeBehavior::ConfirmsSynchronously));
        let orchestrator = test_orchestrator(adapter);

        let response = orchestrator.initiate_payment(payment_request("100.00")).await.unwrap();
        let id: Uuid = response["transaction_id"].as_str().unwrap().parse().unwrap();
        let transaction = orchestrator.get_transaction(id).await.unwrap();
        assert_eq!(transaction.retry_count, 1);
    }
}
