//! Per-request forwarding context.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, request::Parts};

use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::routing::ServiceName;
use crate::security::auth::Principal;

/// Everything the dispatcher needs to forward one request.
#[derive(Debug, Clone)]
pub struct ProxyRequestContext {
    pub request_id: RequestId,
    pub principal: Option<Principal>,
    pub service: ServiceName,
    /// Upstream path including the query string.
    pub upstream_path: String,
    pub client_addr: Option<SocketAddr>,
    pub scheme: String,
    /// Original `Host` seen by the gateway.
    pub host: Option<String>,
}

impl ProxyRequestContext {
    /// Build from request parts populated by the edge middleware. Falls back
    /// to the inbound header (or a fresh ID) when no middleware ran.
    pub fn from_parts(parts: &Parts, service: ServiceName, upstream_path: String) -> Self {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .or_else(|| parts.headers.get(&X_REQUEST_ID).and_then(RequestId::from_header))
            .unwrap_or_else(RequestId::generate);

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()));

        Self {
            request_id,
            principal: parts.extensions.get::<Principal>().cloned(),
            service,
            upstream_path,
            client_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
            scheme: parts.uri.scheme_str().unwrap_or("http").to_string(),
            host,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.principal.as_ref().and_then(Principal::user_id)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.principal.as_ref().and_then(Principal::bearer_token)
    }
}
