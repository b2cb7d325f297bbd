//! AirtelTigo Money adapter.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AdapterError, InitiateRequest, ProviderAdapter, ProviderLimits, ProviderResponse, ProviderStatus, WebhookEvent};
use crate::util::money_amount::Amount;

const PHONE_PREFIXES: &[&str] = &["26", "27", "56", "57"];

struct CachedToken {
    value: String,
    expires_at: std::time::Instant,
}

/// Adapter for AirtelTigo's merchant payment API.
pub struct AirtelTigoAdapter {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    webhook_secret: String,
    limits: ProviderLimits,
    token: Mutex<Option<CachedToken>>,
}

impl AirtelTigoAdapter {
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        webhook_secret: String,
        limits: ProviderLimits,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            client_id,
            client_secret,
            webhook_secret,
            limits,
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().expect("airteltigo token mutex poisoned");
        guard.as_ref().filter(|t| t.expires_at > std::time::Instant::now()).map(|t| t.value.clone())
    }
}

#[async_trait]
impl ProviderAdapter for AirtelTigoAdapter {
    fn provider_tag(&self) -> &str {
        "airteltigo"
    }

    fn supports_phone(&self, phone_digits: &str) -> bool {
        PHONE_PREFIXES.iter().any(|p| phone_digits.starts_with(&format!("233{p}")))
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
            .post(format!("{}/oauth/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Transient(format!("airteltigo auth returned {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }
        let body: TokenResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        let mut guard = self.token.lock().expect("airteltigo token mutex poisoned");
        *guard = Some(CachedToken {
            value: body.access_token,
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(body.expires_in.saturating_sub(30)),
        });
        Ok(())
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<ProviderResponse, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("airteltigo token missing after authenticate".into()))?;
        let response = self
            .client
            .post(format!("{}/merchant/v1/payments", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "amount": request.amount.to_string(),
                "currency": "GHS",
                "clientReference": request.transaction_id.to_string(),
                "msisdn": request.recipient_phone,
                "narration": request.description.clone().unwrap_or_default(),
            }))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(AdapterError::Transient(format!("airteltigo returned {}", response.status())));
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(AdapterError::Permanent(format!("airteltigo rejected request: {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct InitiateResponse {
            #[serde(rename = "transactionId")]
            transaction_id: String,
            status: String,
        }
        let body: InitiateResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(ProviderResponse {
            provider_tx_id: body.transaction_id,
            provider_reference: None,
            status: self.map_status(&body.status),
            message: None,
        })
    }

    async fn status(&self, provider_tx_id: &str) -> Result<ProviderResponse, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("airteltigo token missing after authenticate".into()))?;
        let response = self
            .client
            .get(format!("{}/merchant/v1/payments/{provider_tx_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Transient(format!("airteltigo status returned {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct StatusResponse {
            status: String,
            reference: Option<String>,
        }
        let body: StatusResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(ProviderResponse {
            provider_tx_id: provider_tx_id.to_string(),
            provider_reference: body.reference,
            status: self.map_status(&body.status),
            message: None,
        })
    }

    async fn refund(&self, original_provider_tx_id: &str, amount: Amount, reason: &str) -> Result<String, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("airteltigo token missing after authenticate".into()))?;
        let refund_reference = Uuid::new_v4().to_string();
        let response = self
            .client
            .post(format!("{}/merchant/v1/payments/{original_provider_tx_id}/reversals", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "amount": amount.to_string(), "reason": reason }))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(refund_reference)
        } else {
            Err(AdapterError::Transient(format!("airteltigo refund returned {}", response.status())))
        }
    }

    fn verify_webhook(&self, payload: &[u8], headers: &HashMap<String, String>) -> Option<WebhookEvent> {
        let signature = headers.get("x-at-signature")?;
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()).ok()?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return None;
        }
        let raw: serde_json::Value = serde_json::from_slice(payload).ok()?;
        let provider_tx_id = raw.get("transactionId")?.as_str()?.to_string();
        let status_str = raw.get("status")?.as_str()?;
        Some(WebhookEvent {
            provider_tx_id,
            status: self.map_status(status_str),
            provider_reference: raw.get("reference").and_then(|v| v.as_str()).map(str::to_string),
            raw,
        })
    }

    fn map_status(&self, provider_status: &str) -> ProviderStatus {
        match provider_status {
            "COMPLETED" => ProviderStatus::Confirmed,
            "QUEUED" | "SUBMITTED" => ProviderStatus::Pending,
            "PROCESSING" => ProviderStatus::Processing,
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

    fn adapter() -> AirtelTigoAdapter {
        AirtelTigoAdapter::new(
            "https://sandbox.airteltigo.example".into(),
            "client".into(),
            "secret".into(),
            "webhook-secret".into(),
            ProviderLimits {
                min: Amount::parse("1.00").unwrap(),
                max: Amount::parse("5000.00").unwrap(),
                daily: Amount::parse("20000.00").unwrap(),
            },
        )
    }

    #[test]
    fn matches_airteltigo_prefixes_only() {
        let adapter = adapter();
        assert!(adapter.supports_phone("233270000001"));
        assert!(!adapter.supports_phone("233241234567"));
    }

    #[test]
    fn maps_completed_to_confirmed() {
        assert_eq!(adapter().map_status("COMPLETED"), ProviderStatus::Confirmed);
    }
}
