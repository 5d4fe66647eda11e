//! Access logging.
//!
//! # Responsibilities
//! - Emit one structured event per request, level by status class
//! - Record request count, latency and in-flight gauges
//! - Stamp `X-Process-Time` (seconds) on every response
//!
//! # Design Decisions
//! - Only the path is logged: query strings and headers may carry credentials
//! - Successful `/health` polls are logged at debug

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::http::server::AppState;
use crate::http::RequestIdExt;
use crate::observability::metrics;
use crate::security::Principal;

pub const X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");

/// Keeps the in-flight gauge balanced even if the request future is dropped.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::inc_active_requests();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::dec_active_requests();
    }
}

macro_rules! access_event {
    ($level:ident, $($field:tt)*) => {
        tracing::$level!($($field)*, "Request completed")
    };
}

pub async fn access_log_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .request_id()
        .map(|id| id.to_string())
        .unwrap_or_default();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let in_flight = InFlight::enter();
    let mut response = next.run(request).await;
    drop(in_flight);

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.4}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(X_PROCESS_TIME, value);
    }
    metrics::record_request(method.as_str(), &path, status, elapsed);

    if !state.access_log_enabled {
        return response;
    }

    let user_id = response
        .extensions()
        .get::<Principal>()
        .and_then(Principal::user_id)
        .unwrap_or("-")
        .to_string();
    let latency_ms = elapsed.as_secs_f64() * 1000.0;

    match status {
        500..=u16::MAX => access_event!(error,
            request_id = %request_id, method = %method, path = %path, status = status,
            latency_ms = latency_ms, client_ip = %client_ip, user_id = %user_id),
        400..=499 => access_event!(warn,
            request_id = %request_id, method = %method, path = %path, status = status,
            latency_ms = latency_ms, client_ip = %client_ip, user_id = %user_id),
        _ if path == "/health" => access_event!(debug,
            request_id = %request_id, method = %method, path = %path, status = status,
            latency_ms = latency_ms, client_ip = %client_ip, user_id = %user_id),
        _ => access_event!(info,
            request_id = %request_id, method = %method, path = %path, status = status,
            latency_ms = latency_ms, client_ip = %client_ip, user_id = %user_id),
    }

    response
}
