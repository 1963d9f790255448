//! JWT token generation and validation

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Principal, UserRole};

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Bearer token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// `customer`, `agent`, `municipality`, `recycler` or `admin`
    pub role: String,
    /// Municipality the user belongs to or administers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<Uuid>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Resolve the typed caller these claims describe
    pub fn principal(&self) -> Result<Principal, JwtError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|e| JwtError::InvalidToken(format!("subject: {}", e)))?;
        let role = self
            .role
            .parse::<UserRole>()
            .map_err(JwtError::InvalidToken)?;
        Ok(Principal::new(user_id, role, self.municipality))
    }
}

/// Sign a token for `principal` valid for `ttl_seconds`
pub fn generate_token(principal: &Principal, secret: &str, ttl_seconds: i64) -> Result<String, JwtError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(ttl_seconds);

    let claims = Claims {
        sub: principal.user_id.to_string(),
        role: principal.role.as_str().to_string(),
        municipality: principal.municipality_id,
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::EncodingFailed(e.to_string()))
}

/// Verify an HS256 token and decode its claims
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::DecodingFailed(e.to_string()),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn municipality_user() -> Principal {
        Principal::new(Uuid::new_v4(), UserRole::Municipality, Some(Uuid::new_v4()))
    }

    #[test]
    fn test_token_carries_principal() {
        let principal = municipality_user();
        let token = generate_token(&principal, "test-secret-key", 900).unwrap();

        let claims = verify_token(&token, "test-secret-key").unwrap();
        assert_eq!(claims.role, "municipality");
        assert_eq!(claims.principal().unwrap(), principal);
    }

    #[test]
    fn test_invalid_token() {
        assert!(verify_token("invalid.token.here", "test-secret-key").is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let token = generate_token(&municipality_user(), "secret1", 900).unwrap();
        assert!(verify_token(&token, "secret2").is_err());
    }

    #[test]
    fn test_expired_token() {
        // Past the default 60s leeway
        let token = generate_token(&municipality_user(), "secret", -120).unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: "oracle".to_string(),
            municipality: None,
            iat: 0,
            exp: 0,
        };
        assert!(matches!(claims.principal(), Err(JwtError::InvalidToken(_))));
    }
}
