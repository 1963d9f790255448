//! Authentication extractors
//!
//! Bearer tokens are resolved into a [`Principal`] once per request.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{AuthService, JwtError};
use crate::models::Principal;

/// Caller resolved from the `Authorization: Bearer` header
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Principal);

#[derive(Debug, Serialize)]
struct AuthError {
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    let body = AuthError {
        error: AuthErrorDetails { code, message },
    };
    (status, Json(body)).into_response()
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    reject(
                        StatusCode::UNAUTHORIZED,
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);
        let principal = auth_service.authenticate(bearer.token()).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            match e {
                JwtError::TokenExpired => {
                    reject(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token has expired")
                }
                _ => reject(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid token"),
            }
        })?;

        Ok(AuthenticatedUser(principal))
    }
}

/// Caller that must hold the admin role
pub struct AdminUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(principal) =
            AuthenticatedUser::from_request_parts(parts, state).await?;

        if !principal.is_admin() {
            return Err(reject(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Admin access required",
            ));
        }

        Ok(AdminUser(principal))
    }
}
