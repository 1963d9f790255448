//! Per-client token-bucket rate limiting

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use crate::error::ApiError;

/// Buckets idle this long are forgotten
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_take(&mut self, refill_per_second: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_second).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state; clones share buckets
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    refill_per_second: f64,
    /// Burst allowance, twice the sustained rate
    capacity: f64,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rate = f64::from(requests_per_second.max(1));
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            refill_per_second: rate,
            capacity: rate * 2.0,
        }
    }

    /// Take one token from `client`'s bucket
    pub async fn check(&self, client: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity))
            .try_take(self.refill_per_second, self.capacity)
    }

    /// Drop buckets that have been idle longer than `max_idle`
    pub async fn sweep(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_idle);
        before - buckets.len()
    }

    /// Periodically sweep idle buckets in the background
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(IDLE_BUCKET_TTL);
            loop {
                interval.tick().await;
                let removed = limiter.sweep(IDLE_BUCKET_TTL).await;
                if removed > 0 {
                    tracing::debug!(removed, "Swept idle rate-limit buckets");
                }
            }
        })
    }
}

/// Middleware rejecting clients that exceed their budget with 429
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);
    if !limiter.check(&client).await {
        tracing::warn!(client = %client, "Rate limit exceeded");
        return ApiError::TooManyRequests.into_response();
    }
    next.run(request).await
}

/// Client identity from proxy headers
pub(crate) fn client_key(request: &Request) -> String {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_reject() {
        let limiter = RateLimiter::new(5);
        for _ in 0..10 {
            assert!(limiter.check("sensor-gw").await);
        }
        assert!(!limiter.check("sensor-gw").await);
    }

    #[tokio::test]
    async fn test_clients_have_separate_buckets() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a").await);
        assert!(limiter.check("a").await);
        assert!(!limiter.check("a").await);
        assert!(limiter.check("b").await);
    }

    #[tokio::test]
    async fn test_sweep_forgets_idle_clients() {
        let limiter = RateLimiter::new(1);
        limiter.check("a").await;
        limiter.check("b").await;

        assert_eq!(limiter.sweep(Duration::from_secs(60)).await, 0);
        assert_eq!(limiter.sweep(Duration::ZERO).await, 2);
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "10.0.0.7, 172.16.0.1")
            .header("x-real-ip", "192.168.1.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "10.0.0.7");

        let request = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");
    }
}
