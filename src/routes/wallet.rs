//! Wallet routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::wallet;

/// Create wallet routes, self-service and operator
pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/api/wallet", get(wallet::get_wallet))
        .route("/api/wallet/transactions", get(wallet::list_transactions))
        .route("/api/wallet/top-up", post(wallet::top_up))
        .route("/api/wallet/audit", get(wallet::audit_own))
        .route("/api/admin/wallets/:owner_id", post(wallet::open_wallet))
        .route("/api/admin/wallets/:owner_id/audit", get(wallet::audit_wallet))
        .route("/api/admin/wallets/:owner_id/credit", post(wallet::credit_wallet))
        .route("/api/admin/wallets/:owner_id/debit", post(wallet::debit_wallet))
}
