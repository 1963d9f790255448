//! Wallet ledger
//!
//! Balances move only through credit and debit postings, each written together
//! with its immutable transaction record inside one unit of work.

mod model;
mod service;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub use model::*;
pub(crate) use service::post_transfer;
pub use service::LedgerService;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient funds in wallet {wallet_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        wallet_id: Uuid,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("No wallet for user {0}")]
    WalletNotFound(Uuid),

    #[error("Unknown user {0}")]
    UnknownOwner(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
