//! Smart bin routes

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::app_state::AppState;
use crate::handlers::bins;
use crate::middleware::require_device_key;

/// Sensor ingestion, guarded by the shared device key when one is configured
pub fn sensor_routes(ingest_key: Option<Arc<str>>) -> Router<AppState> {
    Router::new()
        .route("/api/bin-status", post(bins::ingest_reading))
        .route("/api/bin-status/:bin_id", get(bins::bin_status))
        .route_layer(from_fn_with_state(ingest_key, require_device_key))
}

/// Bin management for authenticated users
pub fn bin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/bins", post(bins::provision_bin))
        .route("/api/bins/:bin_id", get(bins::get_bin))
        .route("/api/bins/:bin_id/link", post(bins::link_bin))
        .route("/api/bins/:bin_id/deactivate", post(bins::deactivate_bin))
}
