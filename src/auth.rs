//! Bearer-token authentication and coarse permission checks (spec §6.1).
//!
//! Grounded on the BetterAuth JWT + permission-check pattern the ambient
//! stack promises: a JWT identifies the caller and carries the permissions
//! a route demands; amounts at or above a configured threshold additionally
//! require an MFA token header, mirroring `require_mfa_for_amount`.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::util::money_amount::Amount;

/// Claims carried by the bearer token presented on every protected route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user id; must match the `user_id` a payment acts on.
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub permissions: Vec<String>,
}

pub mod permissions {
    pub const PAYMENT_INITIATE: &str = "payment:initiate";
    pub const PAYMENT_REFUND: &str = "payment:refund";
    pub const PAYMENT_STATUS: &str = "payment:status";
}

const ADMIN_PERMISSION: &str = "system:admin";

/// Extracts and validates the bearer JWT from `Authorization`, returning its claims.
pub fn authenticate(headers: &HeaderMap, jwt_secret: &str) -> Result<Claims, OrchestratorError> {
    let header_value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OrchestratorError::Unauthorized("missing authorization header".to_string()))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| OrchestratorError::Unauthorized("authorization header is not a bearer token".to_string()))?;

    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(jwt_secret.as_bytes()), &validation)
        .map_err(|e| OrchestratorError::Unauthorized(format!("invalid token: {e}")))?;
    Ok(data.claims)
}

/// Rejects with 403 unless `claims` carries `permission` or the admin catch-all.
pub fn require_permission(claims: &Claims, permission: &str) -> Result<(), OrchestratorError> {
    if claims.permissions.iter().any(|p| p == permission || p == ADMIN_PERMISSION) {
        Ok(())
    } else {
        Err(OrchestratorError::Forbidden(format!("missing permission {permission}")))
    }
}

/// Mirrors `require_mfa_for_amount`: amounts at or above `threshold` require an
/// `X-MFA-Token` header. This reference implementation checks presence only,
/// not a real one-time-code verification against an MFA provider.
pub fn require_mfa_if_large(headers: &HeaderMap, amount: Amount, threshold: Amount) -> Result<(), OrchestratorError> {
    if amount.as_decimal() < threshold.as_decimal() {
        return Ok(());
    }
    match headers.get("x-mfa-token").and_then(|v| v.to_str().ok()) {
        Some(token) if !token.is_empty() => Ok(()),
        _ => Err(OrchestratorError::MfaRequired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, permissions: Vec<String>) -> String {
        let claims = Claims {
            sub: "u1".to_string(),
            exp: 9_999_999_999,
            permissions,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_bearer_token_authenticates() {
        let mut headers = HeaderMap::new();
        let jwt = token("secret", vec![permissions::PAYMENT_INITIATE.to_string()]);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap());
        let claims = authenticate(&headers, "secret").unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(authenticate(&headers, "secret"), Err(OrchestratorError::Unauthorized(_))));
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let claims = Claims {
            sub: "u1".to_string(),
            exp: 9_999_999_999,
            permissions: vec![permissions::PAYMENT_STATUS.to_string()],
        };
        assert!(matches!(
            require_permission(&claims, permissions::PAYMENT_INITIATE),
            Err(OrchestratorError::Forbidden(_))
        ));
    }

    #[test]
    fn mfa_required_only_above_threshold() {
        let headers = HeaderMap::new();
        let threshold = Amount::parse("5000.00").unwrap();
        assert!(require_mfa_if_large(&headers, Amount::parse("10.00").unwrap(), threshold).is_ok());
        assert!(matches!(
            require_mfa_if_large(&headers, Amount::parse("9000.00").unwrap(), threshold),
            Err(OrchestratorError::MfaRequired)
        ));
    }
}
