//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, breaker state, instance health)
//! - Expose Prometheus-compatible metrics via a shared recorder handle
//! - Track per-service and aggregate metrics
//!
//! # Metrics
//! - `api_gateway_requests_total` (counter): requests by method, endpoint, status
//! - `api_gateway_request_duration_seconds` (histogram): edge latency
//! - `api_gateway_active_requests` (gauge): in-flight requests
//! - `api_gateway_service_requests_total` (counter): backend calls by service, method, status
//! - `api_gateway_service_request_duration_seconds` (histogram): backend latency
//! - `api_gateway_circuit_breaker_state` (gauge): 0 closed, 1 open, 2 half-open
//! - `api_gateway_rate_limit_hits_total` (counter): rejected requests by client kind
//! - `api_gateway_instance_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Facade macros are no-ops until a recorder is installed (tests stay isolated)
//! - Path labels are normalized to keep cardinality bounded

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::resilience::CircuitState;
use crate::routing::ServiceName;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the process-wide Prometheus recorder. Idempotent.
pub fn init_metrics() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus recorder installed");
                Some(handle)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        })
        .clone()
}

/// Render the current metrics in Prometheus text format.
pub fn render() -> Option<String> {
    HANDLE.get().and_then(|h| h.as_ref()).map(|h| h.render())
}

pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    counter!(
        "api_gateway_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint.clone(),
        "status_code" => status.to_string()
    )
    .increment(1);
    histogram!(
        "api_gateway_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint
    )
    .record(duration.as_secs_f64());
}

pub fn inc_active_requests() {
    gauge!("api_gateway_active_requests").increment(1.0);
}

pub fn dec_active_requests() {
    gauge!("api_gateway_active_requests").decrement(1.0);
}

pub fn record_service_request(service: ServiceName, method: &str, status: u16, duration: Duration) {
    counter!(
        "api_gateway_service_requests_total",
        "service" => service.as_str(),
        "method" => method.to_string(),
        "status_code" => status.to_string()
    )
    .increment(1);
    histogram!(
        "api_gateway_service_request_duration_seconds",
        "service" => service.as_str(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_breaker_state(service: ServiceName, state: CircuitState) {
    gauge!("api_gateway_circuit_breaker_state", "service" => service.as_str()).set(state.as_gauge());
}

pub fn record_rate_limit_hit(client_kind: &'static str) {
    counter!("api_gateway_rate_limit_hits_total", "client_type" => client_kind).increment(1);
}

pub fn record_instance_health(service: ServiceName, instance: &str, healthy: bool) {
    gauge!(
        "api_gateway_instance_health",
        "service" => service.as_str(),
        "instance" => instance.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Replace identifier-like path segments with placeholders.
pub fn normalize_endpoint(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}"
            } else if looks_like_uuid(segment) {
                "{id}"
            } else if segment.len() > 32 {
                "{token}"
            } else {
                segment
            }
        })
        .collect();
    segments.join("/")
}

fn looks_like_uuid(segment: &str) -> bool {
    segment.len() == 36
        && segment.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_identifiers() {
        assert_eq!(normalize_endpoint("/api/v1/nin/12345"), "/api/v1/nin/{id}");
        assert_eq!(
            normalize_endpoint("/api/v1/auth/users/550e8400-e29b-41d4-a716-446655440000/roles"),
            "/api/v1/auth/users/{id}/roles"
        );
        assert_eq!(
            normalize_endpoint(&format!("/api/v1/config/{}", "a".repeat(40))),
            "/api/v1/config/{token}"
        );
        assert_eq!(normalize_endpoint("/health"), "/health");
    }
}
