//! Sliding-window rate limiting middleware.
//!
//! # Responsibilities
//! - Count requests per client identity over a sliding window
//! - Reject with 429 and advertise limits via `X-RateLimit-*` headers
//! - Purge idle windows so memory stays bounded

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::auth::Principal;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Per-client sliding log of request timestamps.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests, Duration::from_secs(config.window_secs))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request for `client` if it fits in the window.
    pub fn check(&self, client: &str) -> RateDecision {
        let now = Instant::now();
        let mut log = self.windows.entry(client.to_string()).or_default();
        while log.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            log.pop_front();
        }

        if log.len() as u32 >= self.limit {
            let retry_after = log
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return RateDecision::Limited { retry_after };
        }

        log.push_back(now);
        RateDecision::Allowed {
            remaining: self.limit - log.len() as u32,
        }
    }

    /// Drop windows with no request inside the current window. Returns how
    /// many clients were forgotten.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, log| log.back().is_some_and(|t| now.duration_since(*t) < self.window));
        before - self.windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Identity used as the rate limiting key, and its kind for metrics.
pub fn client_key(request: &Request<Body>) -> (String, &'static str) {
    match request.extensions().get::<Principal>() {
        Some(Principal::User {
            user_id: Some(id), ..
        }) => (format!("user:{}", id), "user"),
        Some(Principal::ApiKey { key }) => (format!("api_key:{}", key), "api_key"),
        _ => {
            let ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (format!("ip:{}", ip), "ip")
        }
    }
}

/// Middleware function for rate limiting.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (key, kind) = client_key(&request);

    match limiter.check(&key) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            set_limit_headers(response.headers_mut(), &limiter, Some(remaining));
            response
        }
        RateDecision::Limited { retry_after } => {
            tracing::warn!(client_type = kind, "Rate limit exceeded");
            metrics::record_rate_limit_hit(kind);

            let window = limiter.window().as_secs();
            let body = serde_json::json!({
                "error": "Rate limit exceeded",
                "message": format!("Maximum {} requests per {} seconds", limiter.limit(), window),
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            let retry_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_secs));
            set_limit_headers(headers, &limiter, None);
            response
        }
    }
}

fn set_limit_headers(headers: &mut HeaderMap, limiter: &RateLimiter, remaining: Option<u32>) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limiter.limit()));
    headers.insert(X_RATELIMIT_WINDOW, HeaderValue::from(limiter.window().as_secs()));
    if let Some(remaining) = remaining {
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sliding_window_limits_and_recovers() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert_eq!(limiter.check("ip:1"), RateDecision::Allowed { remaining: 1 });
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.check("ip:1"), RateDecision::Allowed { remaining: 0 });
        assert_eq!(
            limiter.check("ip:1"),
            RateDecision::Limited {
                retry_after: Duration::from_secs(30)
            }
        );
        // Other clients are independent.
        assert!(matches!(limiter.check("ip:2"), RateDecision::Allowed { .. }));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.check("ip:1"), RateDecision::Allowed { remaining: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn purges_idle_clients() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        limiter.check("a");
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.check("b");
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn keys_by_identity_then_ip() {
        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.7:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_key(&request), ("ip:192.0.2.7".to_string(), "ip"));

        request.extensions_mut().insert(Principal::ApiKey {
            key: "sk-abcdefghijklmnopqrstu".into(),
        });
        assert_eq!(client_key(&request).1, "api_key");

        request.extensions_mut().insert(Principal::User {
            user_id: Some("7".into()),
            token: "t".into(),
        });
        assert_eq!(client_key(&request).0, "user:7");
    }
}
