//! Tower-level middleware: per-IP fixed-window rate limiting, security
//! headers, and request metrics.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use aspree_api::error::ApiError;
use aspree_core::metrics::MetricsCollector;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::HeaderValue;

use crate::extract::client_meta_of;

/// A fixed-window per-IP rate limiter. Windows are coarse on purpose; the
/// goal is blocking bulk abuse per address, not precise shaping.
pub struct RateLimiter {
    name: &'static str,
    max_requests: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(
        name: &'static str,
        max_requests: u32,
        window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            max_requests,
            window,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// The three buckets: auth 200, general 1000, AI-backed 100, all per
    /// 15 minutes per IP.
    pub fn auth() -> Arc<Self> {
        Self::new("auth", 200, Duration::from_secs(15 * 60))
    }
    pub fn general() -> Arc<Self> {
        Self::new("general", 1000, Duration::from_secs(15 * 60))
    }
    pub fn heavy() -> Arc<Self> {
        Self::new("heavy", 100, Duration::from_secs(15 * 60))
    }

    /// Count one request; returns whether it is allowed.
    pub fn allow(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();

        // Drop stale windows opportunistically once the map grows.
        if buckets.len() > 10_000 {
            let window = self.window;
            buckets
                .retain(|_ip, (start, _n)| now.duration_since(*start) < window);
        }

        let (start, count) =
            buckets.entry(ip.to_owned()).or_insert((now, 0));
        if now.duration_since(*start) >= self.window {
            *start = now;
            *count = 0;
        }
        *count += 1;
        *count <= self.max_requests
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let meta = client_meta_of(&parts);
    if !limiter.allow(&meta.ip) {
        tracing::warn!(
            bucket = limiter.name,
            ip = %meta.ip,
            "rate limit exceeded"
        );
        return ApiError::rate_limited(
            "Too many requests; please retry later",
        )
        .into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}

/// Record counters + latency for every request.
pub async fn track_metrics(
    State(metrics): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();
    metrics.record_request(!response.status().is_server_error(), elapsed);
    response
}

/// Security headers: strict CSP in production, relaxed in dev so local
/// tooling (hot reload, inline scripts) keeps working.
pub async fn security_headers(
    State(production): State<bool>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-frame-options",
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    if production {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static(
                "max-age=31536000; includeSubDomains",
            ),
        );
        headers.insert(
            "content-security-policy",
            HeaderValue::from_static(
                "default-src 'self'; img-src 'self' https: data:; \
                 object-src 'none'; frame-ancestors 'none'",
            ),
        );
    } else {
        headers.insert(
            "content-security-policy",
            HeaderValue::from_static(
                "default-src 'self' 'unsafe-inline' 'unsafe-eval' https: \
                 http: data:",
            ),
        );
    }
    response
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_window_allows_then_blocks() {
        let limiter =
            RateLimiter::new("test", 3, Duration::from_secs(15 * 60));
        for _ in 0..3 {
            assert!(limiter.allow("203.0.113.7"));
        }
        assert!(!limiter.allow("203.0.113.7"));
        // Another ip is unaffected.
        assert!(limiter.allow("203.0.113.8"));
    }
}
