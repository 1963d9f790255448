//! Price configuration HTTP handlers

use axum::{
    extract::{Query, State},
    Json,
};
use validator::Validate;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::handlers::AuthenticatedUser;
use crate::pricing::{scope_from_query, PriceConfiguration, Quote, ScopeQuery, SetPriceRequest};

/// GET /api/prices?municipality_id=|recycler_id= - Configured prices of a scope
pub async fn list_prices(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<PriceConfiguration>>, ApiError> {
    let scope = scope_from_query(query.municipality_id, query.recycler_id)?;
    Ok(Json(state.pricing.list_prices(scope).await?))
}

/// GET /api/prices/quote - Applicable price, falling back to the default
pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Quote>, ApiError> {
    let scope = scope_from_query(query.municipality_id, query.recycler_id)?;
    let waste_type = query
        .waste_type
        .ok_or_else(|| ApiError::InvalidInput("waste_type is required".to_string()))?;
    Ok(Json(state.pricing.resolve(scope, waste_type).await?))
}

/// PUT /api/prices - Set a price within the caller's own scope
pub async fn set_price(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(req): Json<SetPriceRequest>,
) -> Result<Json<PriceConfiguration>, ApiError> {
    req.validate()?;
    Ok(Json(state.pricing.set_price(&principal, req).await?))
}
