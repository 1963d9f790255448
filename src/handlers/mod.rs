//! API handlers for the SMARTRASH backend

pub mod bins;
pub mod health;
pub mod pricing;
pub mod tasks;
pub mod wallet;

pub use health::{health_check, root};

// Re-export extractors from middleware for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser};
