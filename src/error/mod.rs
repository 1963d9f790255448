//! Centralized API error handling for SMARTRASH
//!
//! Every component error converts into [`ApiError`], which picks the HTTP
//! status and renders `{"error": {"code", "message"}}`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::bins::BinError;
use crate::collection::WorkflowError;
use crate::ledger::LedgerError;
use crate::pricing::PricingError;
use crate::store::StoreError;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("Already linked: {0}")]
    AlreadyLinked(String),

    #[error("{0}")]
    IdentityMismatch(String),

    #[error("{0}")]
    InvalidAgent(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::InvalidState(_) => "INVALID_STATE",
            ApiError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            ApiError::AlreadyLinked(_) => "ALREADY_LINKED",
            ApiError::IdentityMismatch(_) => "IDENTITY_MISMATCH",
            ApiError::InvalidAgent(_) => "INVALID_AGENT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests => "TOO_MANY_REQUESTS",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::InvalidState(_) | ApiError::AlreadyLinked(_) | ApiError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            ApiError::IdentityMismatch(_) | ApiError::InvalidAgent(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log server errors
        match &self {
            ApiError::InternalError(_)
            | ApiError::DatabaseError(_)
            | ApiError::ServiceUnavailable(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
            },
        };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) | StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            StoreError::Database(msg) | StoreError::Corrupt(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            e @ LedgerError::InsufficientFunds { .. } => ApiError::InsufficientFunds(e.to_string()),
            e @ (LedgerError::WalletNotFound(_) | LedgerError::UnknownOwner(_)) => {
                ApiError::NotFound(e.to_string())
            }
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<BinError> for ApiError {
    fn from(err: BinError) -> Self {
        match err {
            e @ BinError::NotFound(_) => ApiError::NotFound(e.to_string()),
            e @ BinError::InvalidReading(_) => ApiError::InvalidInput(e.to_string()),
            BinError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            BinError::AlreadyLinked(bin_id) => {
                ApiError::AlreadyLinked(format!("bin {} belongs to another customer", bin_id))
            }
            e @ BinError::Inactive(_) => ApiError::InvalidState(e.to_string()),
            e @ BinError::DuplicateBinId(_) => ApiError::Conflict(e.to_string()),
            BinError::Unauthorized(msg) => ApiError::Forbidden(msg),
            BinError::Store(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound(msg) => ApiError::NotFound(msg),
            e @ WorkflowError::InvalidState { .. } => ApiError::InvalidState(e.to_string()),
            WorkflowError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            e @ WorkflowError::InvalidAgent(_) => ApiError::InvalidAgent(e.to_string()),
            e @ WorkflowError::IdentityMismatch { .. } => ApiError::IdentityMismatch(e.to_string()),
            WorkflowError::Unauthorized(msg) => ApiError::Forbidden(msg),
            e @ WorkflowError::InsufficientFunds { .. } => {
                ApiError::InsufficientFunds(e.to_string())
            }
            WorkflowError::Store(e) => e.into(),
        }
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            PricingError::Unauthorized(msg) => ApiError::Forbidden(msg),
            PricingError::Store(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::InvalidInput(err.to_string())
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::NotFound("test".to_string()).error_code(), "NOT_FOUND");
        assert_eq!(ApiError::InvalidInput("test".to_string()).error_code(), "INVALID_INPUT");
        assert_eq!(
            ApiError::InsufficientFunds("test".to_string()).error_code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(ApiError::TooManyRequests.error_code(), "TOO_MANY_REQUESTS");
    }

    #[test]
    fn test_domain_kinds_have_distinct_statuses() {
        let errors = [
            ApiError::NotFound(String::new()),
            ApiError::InvalidInput(String::new()),
            ApiError::InvalidState(String::new()),
            ApiError::InsufficientFunds(String::new()),
            ApiError::Forbidden(String::new()),
            ApiError::AlreadyLinked(String::new()),
            ApiError::IdentityMismatch(String::new()),
            ApiError::InvalidAgent(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.error_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());

        assert_eq!(errors[3].status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(errors[2].status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_transient_store_faults_are_unavailable() {
        let err: ApiError = StoreError::Unavailable("pool timed out".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");

        let err: ApiError = StoreError::Database("syntax".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_insufficient_funds_mapping() {
        let err: ApiError = LedgerError::InsufficientFunds {
            wallet_id: Uuid::nil(),
            balance: dec!(100.00),
            requested: dec!(150.00),
        }
        .into();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");

        let err: ApiError = WorkflowError::InsufficientFunds {
            balance: dec!(100.00),
            requested: dec!(150.00),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_bin_errors() {
        let err: ApiError = BinError::AlreadyLinked("BIN001".to_string()).into();
        assert_eq!(err.error_code(), "ALREADY_LINKED");
        let err: ApiError = BinError::InvalidReading(150).into();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        let err: ApiError = BinError::Inactive("BIN001".to_string()).into();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }
}
