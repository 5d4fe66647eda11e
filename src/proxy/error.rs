//! Gateway-level failure taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::routing::{ServiceName, UnknownService};

/// Why a dispatch did not produce a backend response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Service '{0}' not found")]
    UnknownService(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Service '{0}' has no available instances")]
    NoInstances(ServiceName),

    #[error("Service '{0}' is temporarily unavailable")]
    CircuitOpen(ServiceName),

    #[error("Service '{0}' request timeout")]
    Timeout(ServiceName),

    #[error("Service '{0}' is unavailable")]
    Unavailable(ServiceName),

    #[error("Bad gateway: {0}")]
    BadGateway(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UnknownService(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::NoInstances(_) | ProxyError::CircuitOpen(_) | ProxyError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<UnknownService> for ProxyError {
    fn from(e: UnknownService) -> Self {
        ProxyError::UnknownService(e.0)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

/// Transport-level failure of one backend attempt. Every variant counts
/// against the service's circuit breaker.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl UpstreamFailure {
    pub fn is_connect(&self) -> bool {
        matches!(self, UpstreamFailure::Connect(_))
    }

    pub fn into_proxy_error(self, service: ServiceName) -> ProxyError {
        match self {
            UpstreamFailure::Connect(_) => ProxyError::Unavailable(service),
            UpstreamFailure::Timeout(_) => ProxyError::Timeout(service),
            UpstreamFailure::Other(message) => ProxyError::BadGateway(message),
        }
    }
}
