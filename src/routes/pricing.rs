//! Price configuration routes

use axum::{routing::get, Router};

use crate::app_state::AppState;
use crate::handlers::pricing;

pub fn pricing_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/prices",
            get(pricing::list_prices).put(pricing::set_price),
        )
        .route("/api/prices/quote", get(pricing::quote))
}
