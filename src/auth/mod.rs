//! Authentication module for SMARTRASH
//!
//! Callers present an HS256 bearer token whose claims name the user, the
//! role and, where relevant, the municipality. It is resolved once per
//! request into a typed [`Principal`](crate::models::Principal).

mod jwt;
mod service;

pub use jwt::{generate_token, verify_token, Claims, JwtError};
pub use service::AuthService;
