//! Middleware for the SMARTRASH API
//!
//! Request tracing, rate limiting, security headers, sensor device keys and
//! bearer authentication.

pub mod auth;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser};
pub use rate_limiter::{rate_limit, RateLimiter};
pub use security::{hsts_header, require_device_key, security_headers, DEVICE_KEY_HEADER};
pub use tracing::request_tracing;
