//! Fraud scoring contract (spec §6.2).
//!
//! Opaque and replaceable: the orchestrator depends only on [`FraudScorer`].
//! [`ThresholdScorer`] is a deterministic stand-in suitable for tests and
//! local runs, not a real fraud model.

use async_trait::async_trait;

use crate::types::{RiskLevel, UserId};
use crate::util::money_amount::Amount;

#[derive(Debug, Clone)]
pub struct FraudFeatures<'a> {
    pub user_id: &'a UserId,
    pub amount: Amount,
    pub recipient_phone_digits: &'a str,
    pub user_transaction_count_24h: u32,
    pub user_failed_count_24h: u32,
}

#[derive(Debug, Clone)]
pub struct FraudVerdict {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub is_fraud: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

#[async_trait]
pub trait FraudScorer: Send + Sync {
    async fn score(&self, features: &FraudFeatures<'_>) -> FraudVerdict;
}

/// Reference implementation: thresholds on amount and recent failure history.
/// A stand-in for a real model, kept deterministic so tests can pin outcomes.
pub struct ThresholdScorer {
    pub high_amount_threshold: Amount,
    pub critical_amount_threshold: Amount,
}

impl Default for ThresholdScorer {
    fn default() -> Self {
        Self {
            high_amount_threshold: Amount::parse("2000.00").expect("valid default"),
            critical_amount_threshold: Amount::parse("8000.00").expect("valid default"),
        }
    }
}

#[async_trait]
impl FraudScorer for ThresholdScorer {
    async fn score(&self, features: &FraudFeatures<'_>) -> FraudVerdict {
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        if features.amount.as_decimal() >= self.critical_amount_threshold.as_decimal() {
            score += 0.6;
            reasons.push("amount at or above critical threshold".to_string());
        } else if features.amount.as_decimal() >= self.high_amount_threshold.as_decimal() {
            score += 0.3;
            reasons.push("amount at or above high threshold".to_string());
        }

        if features.user_failed_count_24h >= 3 {
            score += 0.4;
            reasons.push("repeated failures in the last 24h".to_string());
        }

        if features.user_transaction_count_24h >= 20 {
            score += 0.2;
            reasons.push("unusually high transaction volume in the last 24h".to_string());
        }

        let risk_score = score.min(1.0);
        let risk_level = match risk_score {
            s if s >= 0.8 => RiskLevel::Critical,
            s if s >= 0.5 => RiskLevel::High,
            s if s >= 0.2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        };

        FraudVerdict {
            risk_score,
            risk_level,
            is_fraud: risk_score >= 0.8,
            confidence: if reasons.is_empty() { 1.0 } else { 0.7 },
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn features(amount: &str, failed: u32) -> (UserId, Amount) {
        (UserId::parse("u1").unwrap(), Amount::parse(amount).unwrap())
    }

    #[tokio::test]
    async fn low_amount_clean_history_is_low_risk() {
        let scorer = ThresholdScorer::default();
        let (user_id, amount) = features("50.00", 0);
        let verdict = scorer
            .score(&FraudFeatures {
                user_id: &user_id,
                amount,
                recipient_phone_digits: "233241234567",
                user_transaction_count_24h: 1,
                user_failed_count_24h: 0,
            })
            .await;
        assert_eq!(verdict.risk_level, RiskLevel::Low);
        assert!(!verdict.is_fraud);
    }

    #[tokio::test]
    async fn critical_amount_with_failure_history_is_flagged_as_fraud() {
        let scorer = ThresholdScorer::default();
        let (user_id, amount) = features("9000.00", 3);
        let verdict = scorer
            .score(&FraudFeatures {
                user_id: &user_id,
                amount,
                recipient_phone_digits: "233241234567",
                user_transaction_count_24h: 5,
                user_failed_count_24h: 3,
            })
            .await;
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert!(verdict.is_fraud);
    }
}
