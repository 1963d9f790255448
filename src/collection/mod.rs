//! Collection workflow
//!
//! Lifecycle of bin collections and recycling pickups:
//! `pending → assigned → collected → verified`, with `cancelled` reachable
//! before pickup. Verification settles the task's amount through the ledger
//! in the same unit of work as the status change.

mod model;
mod service;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::pricing::PricingError;
use crate::store::StoreError;

pub use model::*;
pub use service::WorkflowService;

/// Workflow errors
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} task {task_id} while it is {}", status.as_str())]
    InvalidState {
        task_id: Uuid,
        status: TaskStatus,
        action: &'static str,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid agent: {0}")]
    InvalidAgent(String),

    #[error("Bin identity mismatch: expected {expected}, presented '{presented}'")]
    IdentityMismatch { expected: String, presented: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LedgerError> for WorkflowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                balance, requested, ..
            } => WorkflowError::InsufficientFunds { balance, requested },
            LedgerError::InvalidInput(msg) => WorkflowError::InvalidInput(msg),
            LedgerError::WalletNotFound(owner) | LedgerError::UnknownOwner(owner) => {
                WorkflowError::NotFound(format!("wallet for user {}", owner))
            }
            LedgerError::Store(e) => WorkflowError::Store(e),
        }
    }
}

impl From<PricingError> for WorkflowError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidInput(msg) => WorkflowError::InvalidInput(msg),
            PricingError::Unauthorized(msg) => WorkflowError::Unauthorized(msg),
            PricingError::Store(e) => WorkflowError::Store(e),
        }
    }
}
