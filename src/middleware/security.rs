//! Response hardening and the sensor device-key guard

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;

/// Header sensors use to present the shared ingestion key
pub const DEVICE_KEY_HEADER: &str = "x-device-key";

/// Headers for a JSON-only API
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    // Wallet balances and task state must never be served from a cache
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}

/// HSTS, for production deployments behind TLS
pub async fn hsts_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}

/// Reject sensor requests without the configured device key.
/// With no key configured every request passes.
pub async fn require_device_key(
    State(expected): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = expected.as_deref() {
        let presented = request
            .headers()
            .get(DEVICE_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if !presented.is_some_and(|key| constant_time_eq(key.as_bytes(), expected.as_bytes())) {
            tracing::warn!(path = %request.uri().path(), "Sensor request with missing or wrong device key");
            return ApiError::Unauthorized("valid X-Device-Key required".to_string())
                .into_response();
        }
    }
    next.run(request).await
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"sensor-key", b"sensor-key"));
        assert!(!constant_time_eq(b"sensor-key", b"sensor-kez"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
