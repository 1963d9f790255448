//! Liveness and storage health

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app_state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub version: String,
}

/// GET /health - 200 when the store answers, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, storage) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy", "connected".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "unhealthy",
                format!("error: {}", e),
            )
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            storage,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

pub async fn root() -> &'static str {
    "SMARTRASH API Server"
}
