//! MTN Mobile Money adapter.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AdapterError, InitiateRequest, ProviderAdapter, ProviderLimits, ProviderResponse, ProviderStatus, WebhookEvent};
use crate::util::money_amount::Amount;

const PHONE_PREFIXES: &[&str] = &["24", "54", "55", "59"];

struct CachedToken {
    value: String,
    expires_at: std::time::Instant,
}

/// Adapter for MTN's collections/disbursements API.
pub struct MtnAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    webhook_secret: String,
    limits: ProviderLimits,
    token: Mutex<Option<CachedToken>>,
}

impl MtnAdapter {
    pub fn new(base_url: String, api_key: String, webhook_secret: String, limits: ProviderLimits) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            webhook_secret,
            limits,
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().expect("mtn token mutex poisoned");
        guard.as_ref().filter(|t| t.expires_at > std::time::Instant::now()).map(|t| t.value.clone())
    }
}

#[async_trait]
impl ProviderAdapter for MtnAdapter {
    fn provider_tag(&self) -> &str {
        "mtn"
    }

    fn supports_phone(&self, phone_digits: &str) -> bool {
        PHONE_PREFIXES.iter().any(|p| phone_digits.trim_start_matches('0').starts_with(p) || phone_digits.starts_with(&format!("233{p}")))
    }

    fn limits(&self) -> ProviderLimits {
        self.limits
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        if self.cached_token().is_some() {
            return Ok(());
        }
        let response = self
            .client
            .post(format!("{}/collection/token/", self.base_url))
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Transient(format!("mtn auth returned {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }
        let body: TokenResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        let mut guard = self.token.lock().expect("mtn token mutex poisoned");
        *guard = Some(CachedToken {
            value: body.access_token,
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(body.expires_in.saturating_sub(30)),
        });
        Ok(())
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<ProviderResponse, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("mtn token missing after authenticate".into()))?;
        let reference = Uuid::new_v4().to_string();
        let response = self
            .client
            .post(format!("{}/collection/v1_0/requesttopay", self.base_url))
            .bearer_auth(token)
            .header("X-Reference-Id", &reference)
            .json(&serde_json::json!({
                "amount": request.amount.to_string(),
                "currency": "GHS",
                "externalId": request.transaction_id.to_string(),
                "payer": { "partyIdType": "MSISDN", "partyId": request.recipient_phone },
                "payerMessage": request.description.clone().unwrap_or_default(),
                "payeeNote": request.recipient_name,
            }))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        match response.status().as_u16() {
            202 => Ok(ProviderResponse {
                provider_tx_id: reference,
                provider_reference: None,
                status: ProviderStatus::Pending,
                message: None,
            }),
            429 => Err(AdapterError::RateLimited),
            400..=499 => Err(AdapterError::Permanent(format!("mtn rejected request: {}", response.status()))),
            _ => Err(AdapterError::Transient(format!("mtn returned {}", response.status()))),
        }
    }

    async fn status(&self, provider_tx_id: &str) -> Result<ProviderResponse, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("mtn token missing after authenticate".into()))?;
        let response = self
            .client
            .get(format!("{}/collection/v1_0/requesttopay/{provider_tx_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Transient(format!("mtn status returned {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct StatusResponse {
            status: String,
            #[serde(rename = "financialTransactionId")]
            financial_transaction_id: Option<String>,
        }
        let body: StatusResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(ProviderResponse {
            provider_tx_id: provider_tx_id.to_string(),
            provider_reference: body.financial_transaction_id,
            status: self.map_status(&body.status),
            message: None,
        })
    }

    async fn refund(&self, original_provider_tx_id: &str, amount: Amount, reason: &str) -> Result<String, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("mtn token missing after authenticate".into()))?;
        let reference = Uuid::new_v4().to_string();
        let response = self
            .client
            .post(format!("{}/disbursement/v1_0/refund", self.base_url))
            .bearer_auth(token)
            .header("X-Reference-Id", &reference)
            .json(&serde_json::json!({
                "amount": amount.to_string(),
                "currency": "GHS",
                "referenceIdToRefund": original_provider_tx_id,
                "payerMessage": reason,
            }))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(reference)
        } else {
            Err(AdapterError::Transient(format!("mtn refund returned {}", response.status())))
        }
    }

    fn verify_webhook(&self, payload: &[u8], headers: &HashMap<String, String>) -> Option<WebhookEvent> {
        let signature = headers.get("x-mtn-signature")?;
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()).ok()?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return None;
        }
        let raw: serde_json::Value = serde_json::from_slice(payload).ok()?;
        let provider_tx_id = raw.get("referenceId")?.as_str()?.to_string();
        let status_str = raw.get("status")?.as_str()?;
        Some(WebhookEvent {
            provider_tx_id,
            status: self.map_status(status_str),
            provider_reference: raw.get("financialTransactionId").and_then(|v| v.as_str()).map(str::to_string),
            raw,
        })
    }

    fn map_status(&self, provider_status: &str) -> ProviderStatus {
        match provider_status {
            "SUCCESSFUL" => ProviderStatus::Confirmed,
            "PENDING" => ProviderStatus::Pending,
            "ONGOING" => ProviderStatus::Processing,
            _ => ProviderStatus::Failed,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MtnAdapter {
        MtnAdapter::new(
            "https://sandbox.mtn.example".into(),
            "key".into(),
            "secret".into(),
            ProviderLimits {
                min: Amount::parse("1.00").unwrap(),
                max: Amount::parse("5000.00").unwrap(),
                daily: Amount::parse("20000.00").unwrap(),
            },
        )
    }

    #[test]
    fn matches_ghanaian_mtn_prefixes() {
        let adapter = adapter();
        assert!(adapter.supports_phone("233241234567"));
        assert!(!adapter.supports_phone("233271234567"));
    }

    #[test]
    fn maps_known_status_strings() {
        let adapter = adapter();
        assert_eq!(adapter.map_status("SUCCESSFUL"), ProviderStatus::Confirmed);
        assert_eq!(adapter.map_status("REJECTED"), ProviderStatus::Failed);
    }

    #[test]
    fn rejects_webhook_with_bad_signature() {
        let adapter = adapter();
        let mut headers = HashMap::new();
        headers.insert("x-mtn-signature".to_string(), "deadbeef".to_string());
        assert!(adapter.verify_webhook(b"{}", &headers).is_none());
    }
}
