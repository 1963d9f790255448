//! Pricing resolver
//!
//! Looks up the configured rate for a waste type within a municipality or
//! recycler scope, falling back to logged defaults.

mod model;
mod service;

use thiserror::Error;

use crate::store::StoreError;

pub use model::*;
pub use service::{scope_from_query, PricingResolver};

/// Pricing errors
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
