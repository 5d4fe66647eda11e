//! Request correlation.
//!
//! # Responsibilities
//! - Assign every request an ID (inbound `X-Request-ID` or a fresh UUID v4)
//! - Make the ID available to handlers via request extensions
//! - Echo the ID on the response
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Any inbound ID that is a valid visible-ASCII header value is kept as is

use std::fmt;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation ID attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a caller supplied ID verbatim. Blank or non-ASCII values are
    /// replaced by a generated one.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        let id = value.to_str().ok()?;
        if id.trim().is_empty() {
            return None;
        }
        Some(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convenience accessor on requests.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Middleware assigning the request ID before anything else sees the request.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);

    let header_value = HeaderValue::from_str(id.as_str()).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
    }
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_inbound_ids_verbatim() {
        let id = RequestId::from_header(&HeaderValue::from_static("abc-123")).unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert!(RequestId::from_header(&HeaderValue::from_static("")).is_none());
        assert!(RequestId::from_header(&HeaderValue::from_static("   ")).is_none());

        let long = "t".repeat(200);
        let id = RequestId::from_header(&HeaderValue::from_str(&long).unwrap()).unwrap();
        assert_eq!(id.as_str(), long);
    }

    #[tokio::test]
    async fn middleware_echoes_long_inbound_id() {
        use axum::{routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/",
                get(|request: Request<Body>| async move {
                    request.request_id().map(|id| id.to_string()).unwrap_or_default()
                }),
            )
            .layer(axum::middleware::from_fn(request_id_middleware));

        let supplied = "t".repeat(200);
        let response = app
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, supplied.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[&X_REQUEST_ID], supplied.as_str());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, supplied.as_bytes());
    }

    #[test]
    fn generated_ids_are_uuids() {
        let id = RequestId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }
}
