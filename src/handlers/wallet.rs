//! Wallet HTTP handlers
//!
//! Self-service balance, history and top-up, plus operator endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::handlers::{AdminUser, AuthenticatedUser};
use crate::ledger::{AdjustmentRequest, LedgerAudit, TopUpRequest, Transaction, WalletResponse};

/// GET /api/wallet - Caller's wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.ledger.wallet(principal.user_id).await?;
    Ok(Json(wallet.into()))
}

/// GET /api/wallet/transactions - Caller's history, newest first
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.ledger.history(principal.user_id).await?))
}

/// POST /api/wallet/top-up - Add money to the caller's wallet
pub async fn top_up(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(req): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    req.validate()?;
    let transaction = state
        .ledger
        .top_up(principal.user_id, req.amount, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /api/wallet/audit - Compare the caller's balance with its ledger
pub async fn audit_own(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<Json<LedgerAudit>, ApiError> {
    Ok(Json(state.ledger.audit(principal.user_id).await?))
}

/// POST /api/admin/wallets/:owner_id - Open a user's wallet (idempotent)
pub async fn open_wallet(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.ledger.open_wallet(owner_id).await?;
    Ok(Json(wallet.into()))
}

/// GET /api/admin/wallets/:owner_id/audit
pub async fn audit_wallet(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<LedgerAudit>, ApiError> {
    Ok(Json(state.ledger.audit(owner_id).await?))
}

/// POST /api/admin/wallets/:owner_id/credit - Operator credit
pub async fn credit_wallet(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(owner_id): Path<Uuid>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    req.validate()?;
    let transaction = state
        .ledger
        .credit(owner_id, req.amount, &req.description)
        .await?;
    tracing::info!(admin_id = %admin.user_id, owner_id = %owner_id, "Operator credit");
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// POST /api/admin/wallets/:owner_id/debit - Operator debit
pub async fn debit_wallet(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(owner_id): Path<Uuid>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    req.validate()?;
    let transaction = state
        .ledger
        .debit(owner_id, req.amount, &req.description)
        .await?;
    tracing::info!(admin_id = %admin.user_id, owner_id = %owner_id, "Operator debit");
    Ok((StatusCode::CREATED, Json(transaction)))
}
