//! Authentication service
//!
//! Turns bearer tokens into a [`Principal`]. Identity is issued elsewhere;
//! `issue` exists for operators and tests.

use super::jwt::{generate_token, verify_token, JwtError};
use crate::models::Principal;

/// Bearer token verification
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(jwt_secret: String, token_ttl_seconds: i64) -> Self {
        Self {
            jwt_secret,
            token_ttl_seconds,
        }
    }

    /// Sign a token for `principal`
    pub fn issue(&self, principal: &Principal) -> Result<String, JwtError> {
        generate_token(principal, &self.jwt_secret, self.token_ttl_seconds)
    }

    /// Verify a bearer token and resolve its caller
    pub fn authenticate(&self, token: &str) -> Result<Principal, JwtError> {
        verify_token(token, &self.jwt_secret)?.principal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use uuid::Uuid;

    #[test]
    fn test_issue_then_authenticate() {
        let service = AuthService::new("secret".to_string(), 60);
        let principal = Principal::new(Uuid::new_v4(), UserRole::Customer, None);

        let token = service.issue(&principal).unwrap();
        assert_eq!(service.authenticate(&token).unwrap(), principal);
    }

    #[test]
    fn test_foreign_token_is_rejected() {
        let ours = AuthService::new("ours".to_string(), 60);
        let theirs = AuthService::new("theirs".to_string(), 60);
        let token = theirs
            .issue(&Principal::new(Uuid::new_v4(), UserRole::Admin, None))
            .unwrap();
        assert!(ours.authenticate(&token).is_err());
    }
}
