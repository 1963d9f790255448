//! Smart bin HTTP handlers
//!
//! Sensor ingestion plus provisioning, linking and deactivation.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::app_state::AppState;
use crate::bins::{
    BinSnapshot, FillReadingRequest, FillReadingResponse, ProvisionBinRequest, SmartBin,
};
use crate::error::ApiError;
use crate::handlers::AuthenticatedUser;

/// POST /api/bin-status - Record a sensor fill reading
pub async fn ingest_reading(
    State(state): State<AppState>,
    payload: Result<Json<FillReadingRequest>, JsonRejection>,
) -> Result<Json<FillReadingResponse>, ApiError> {
    let Json(reading) = payload.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    let (bin_id, fill_percentage) = match (reading.bin_id, reading.fill_percentage) {
        (Some(bin_id), Some(fill)) if !bin_id.trim().is_empty() => (bin_id, fill),
        _ => {
            return Err(ApiError::InvalidInput(
                "bin_id and fill_percentage are required".to_string(),
            ))
        }
    };

    let outcome = state
        .bins
        .ingest_fill_level(bin_id.trim(), fill_percentage)
        .await?;
    if let Some(event) = outcome.threshold_crossed {
        state.notifications.on_threshold_crossed(event);
    }

    Ok(Json(FillReadingResponse {
        success: true,
        bin_id: outcome.snapshot.bin_id,
        status: outcome.snapshot.status,
        fill_percentage: outcome.snapshot.fill_percentage,
    }))
}

/// GET /api/bin-status/:bin_id - Current bin status
pub async fn bin_status(
    State(state): State<AppState>,
    Path(bin_id): Path<String>,
) -> Result<Json<BinSnapshot>, ApiError> {
    Ok(Json(state.bins.snapshot(&bin_id).await?))
}

/// POST /api/bins - Provision an unlinked bin
pub async fn provision_bin(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(req): Json<ProvisionBinRequest>,
) -> Result<(StatusCode, Json<SmartBin>), ApiError> {
    req.validate()?;
    let bin = state.bins.provision(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(bin)))
}

/// GET /api/bins/:bin_id - Full bin record
pub async fn get_bin(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(bin_id): Path<String>,
) -> Result<Json<SmartBin>, ApiError> {
    let bin = state.bins.bin(&bin_id).await?;
    let visible = bin.customer_id == Some(principal.user_id)
        || principal.administered_municipality() == Some(bin.municipality_id)
        || principal.is_agent_for(bin.municipality_id)
        || principal.is_admin();
    if !visible {
        return Err(ApiError::Forbidden(
            "bin belongs to another account".to_string(),
        ));
    }
    Ok(Json(bin))
}

/// POST /api/bins/:bin_id/link - Claim an unlinked bin
pub async fn link_bin(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(bin_id): Path<String>,
) -> Result<Json<SmartBin>, ApiError> {
    Ok(Json(state.bins.link(&principal, &bin_id).await?))
}

/// POST /api/bins/:bin_id/deactivate - Take a bin out of service
pub async fn deactivate_bin(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(bin_id): Path<String>,
) -> Result<Json<SmartBin>, ApiError> {
    Ok(Json(state.bins.deactivate(&principal, &bin_id).await?))
}
