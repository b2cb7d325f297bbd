//! Vodafone Cash adapter.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AdapterError, InitiateRequest, ProviderAdapter, ProviderLimits, ProviderResponse, ProviderStatus, WebhookEvent};
use crate::util::money_amount::Amount;

const PHONE_PREFIXES: &[&str] = &["20", "50"];

struct CachedToken {
    value: String,
    expires_at: std::time::Instant,
}

/// Adapter for Vodafone Cash's merchant API. Vodafone confirms payments
/// synchronously far more often than MTN or AirtelTigo, so `initiate` maps
/// straight through to `Confirmed` when the API reports immediate success.
pub struct VodafoneAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    webhook_secret: String,
    limits: ProviderLimits,
    token: Mutex<Option<CachedToken>>,
}

impl VodafoneAdapter {
    pub fn new(
        base_url: String,
        api_key: String,
        api_secret: String,
        webhook_secret: String,
        limits: ProviderLimits,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            api_secret,
            webhook_secret,
            limits,
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().expect("vodafone token mutex poisoned");
        guard.as_ref().filter(|t| t.expires_at > std::time::Instant::now()).map(|t| t.value.clone())
    }
}

#[async_trait]
impl ProviderAdapter for VodafoneAdapter {
    fn provider_tag(&self) -> &str {
        "vodafone"
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
            .post(format!("{}/v2/auth", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Transient(format!("vodafone auth returned {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            token: String,
            ttl_seconds: u64,
        }
        let body: TokenResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        let mut guard = self.token.lock().expect("vodafone token mutex poisoned");
        *guard = Some(CachedToken {
            value: body.token,
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(body.ttl_seconds.saturating_sub(30)),
        });
        Ok(())
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<ProviderResponse, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("vodafone token missing after authenticate".into()))?;
        let response = self
            .client
            .post(format!("{}/v2/cash-in", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "amount": request.amount.to_string(),
                "currency": "GHS",
                "merchantReference": request.transaction_id.to_string(),
                "customerMsisdn": request.recipient_phone,
                "note": request.description.clone().unwrap_or_default(),
            }))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited);
        }
        if response.status().is_server_error() {
            return Err(AdapterError::Transient(format!("vodafone returned {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Permanent(format!("vodafone rejected request: {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct InitiateResponse {
            id: String,
            status: String,
        }
        let body: InitiateResponse = response.json().await.map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(ProviderResponse {
            provider_tx_id: body.id,
            provider_reference: None,
            status: self.map_status(&body.status),
            message: None,
        })
    }

    async fn status(&self, provider_tx_id: &str) -> Result<ProviderResponse, AdapterError> {
        self.authenticate().await?;
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("vodafone token missing after authenticate".into()))?;
        let response = self
            .client
            .get(format!("{}/v2/cash-in/{provider_tx_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Transient(format!("vodafone status returned {}", response.status())));
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
        let token = self.cached_token().ok_or_else(|| AdapterError::Transient("vodafone token missing after authenticate".into()))?;
        let refund_id = Uuid::new_v4().to_string();
        let response = self
            .client
            .post(format!("{}/v2/cash-in/{original_provider_tx_id}/refund", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "amount": amount.to_string(), "reason": reason }))
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(refund_id)
        } else {
            Err(AdapterError::Transient(format!("vodafone refund returned {}", response.status())))
        }
    }

    fn verify_webhook(&self, payload: &[u8], headers: &HashMap<String, String>) -> Option<WebhookEvent> {
        let signature = headers.get("x-vodafone-signature")?;
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()).ok()?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return None;
        }
        let raw: serde_json::Value = serde_json::from_slice(payload).ok()?;
        let provider_tx_id = raw.get("id")?.as_str()?.to_string();
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
            "SUCCESS" => ProviderStatus::Confirmed,
            "PENDING" | "ACCEPTED" => ProviderStatus::Pending,
            "IN_PROGRESS" => ProviderStatus::Processing,
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

    fn adapter() -> VodafoneAdapter {
        VodafoneAdapter::new(
            "https://sandbox.vodafone.example".into(),
            "key".into(),
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
    fn matches_vodafone_prefixes_only() {
        let adapter = adapter();
        assert!(adapter.supports_phone("233200000001"));
        assert!(!adapter.supports_phone("233241234567"));
    }

    #[test]
    fn maps_success_to_confirmed() {
        assert_eq!(adapter().map_status("SUCCESS"), ProviderStatus::Confirmed);
    }
}
