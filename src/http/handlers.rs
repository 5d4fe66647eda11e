//! Route handlers.
//!
//! Proxy routes hand the raw request to the dispatcher. The rest are the
//! gateway's own observability endpoints.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::health::HealthReport;
use crate::http::server::AppState;
use crate::load_balancer::RegistryStatus;
use crate::observability::metrics;
use crate::proxy::ProxyError;
use crate::resilience::{BreakerSettings, CircuitBreakerSnapshot};
use crate::routing::ServiceName;

const API_PREFIX: &str = "/api/v1/";

/// `ANY /api/v1/{service}` and `ANY /api/v1/{service}/{*path}`.
pub async fn proxy(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (service, tail) = split_service_path(request.uri().path());
    let (service, tail) = (service.to_string(), tail.to_string());
    state.dispatcher.proxy_request(request, &service, &tail).await
}

/// Split `/api/v1/<service>/<tail>` into the raw service segment and the
/// still-encoded tail (with its leading slash).
fn split_service_path(path: &str) -> (&str, &str) {
    let rest = path.strip_prefix(API_PREFIX).unwrap_or(path);
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    }
}

#[derive(Serialize)]
pub struct GatewayHealth {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub services: HealthReport,
    pub circuit_breakers: Vec<CircuitBreakerSnapshot>,
}

/// `GET /health`
pub async fn gateway_health(State(state): State<AppState>) -> Json<GatewayHealth> {
    let services = state.services_report().await;
    Json(GatewayHealth {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        services,
        circuit_breakers: state.dispatcher.breakers().snapshots(),
    })
}

/// `GET /metrics`
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Metrics not enabled" })),
        )
            .into_response();
    }
    match metrics::render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "Metrics recorder not installed" })),
        )
            .into_response(),
    }
}

/// `GET /services/health`
pub async fn services_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.services_report().await)
}

/// `GET /services/status`
pub async fn services_status(State(state): State<AppState>) -> Json<RegistryStatus> {
    Json(state.dispatcher.registry().get_status())
}

/// `GET /services/{name}/health`
pub async fn service_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ProxyError> {
    let service = configured_service(&state, &name)?;
    Ok(Json(state.dispatcher.health_check_service(service).await).into_response())
}

/// `GET /services/{name}/metrics`
pub async fn service_metrics(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitBreakerSnapshot>, ProxyError> {
    let service = configured_service(&state, &name)?;
    let snapshot = match state.dispatcher.breakers().get(service) {
        Some(breaker) => breaker.snapshot(),
        None => {
            let settings = state
                .dispatcher
                .service_config(service)
                .map(|c| BreakerSettings::from(&c))
                .unwrap_or_default();
            state.dispatcher.breakers().get_or_create(service, settings).snapshot()
        }
    };
    Ok(Json(snapshot))
}

fn configured_service(state: &AppState, name: &str) -> Result<ServiceName, ProxyError> {
    let service: ServiceName = name.parse()?;
    if state.dispatcher.service_config(service).is_none() {
        return Err(ProxyError::UnknownService(name.to_string()));
    }
    Ok(service)
}
