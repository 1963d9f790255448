//! Smart bin domain module
//!
//! Fill-level tracking, status derivation and customer linking. Readings that
//! push a bin into a status needing collection come back to the caller as a
//! [`ThresholdCrossed`] event instead of triggering anything here.

mod model;
mod service;

use thiserror::Error;

use crate::store::StoreError;

pub use model::*;
pub use service::BinService;

/// Bin errors
#[derive(Error, Debug)]
pub enum BinError {
    #[error("Bin not found: {0}")]
    NotFound(String),

    #[error("Fill percentage {0} is outside 0..=100")]
    InvalidReading(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bin {0} is already linked")]
    AlreadyLinked(String),

    #[error("Bin {0} is deactivated")]
    Inactive(String),

    #[error("Bin ID {0} is already taken")]
    DuplicateBinId(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
