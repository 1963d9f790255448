//! Route definitions for the SMARTRASH API

mod bins;
mod pricing;
mod tasks;
mod wallet;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use bins::{bin_routes, sensor_routes};
pub use pricing::pricing_routes;
pub use tasks::task_routes;
pub use wallet::wallet_routes;

use crate::app_state::AppState;
use crate::handlers;
use crate::middleware::{rate_limit, request_tracing, security_headers, RateLimiter};

/// Full application router with the shared middleware stack.
/// CORS and HSTS depend on the deployment and are layered by the binary.
pub fn app_router(state: AppState, rate_limiter: RateLimiter) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(sensor_routes(state.ingest_key.clone()))
        .merge(bin_routes())
        .merge(wallet_routes())
        .merge(task_routes())
        .merge(pricing_routes())
        .with_state(state)
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_tracing))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit))
        .layer(TraceLayer::new_for_http())
}
