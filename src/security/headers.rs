//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (and any named in `Connection`)
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Attach correlation and identity headers for the backend
//!
//! # Design Decisions
//! - Client supplied `X-Forwarded-*` and `X-User-Id` are replaced, never trusted
//! - `Host` and `Content-Length` are recomputed by the HTTP client
//! - The caller's bearer token is forwarded as-is; the gateway never mints credentials

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::proxy::context::ProxyRequestContext;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// Headers meaningful only for a single connection.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Header names listed in a `Connection` header.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Build the header set sent to the backend.
pub fn prepare_upstream_headers(inbound: &HeaderMap, ctx: &ProxyRequestContext) -> HeaderMap {
    let dropped = connection_tokens(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len() + 5);

    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || name == header::CONTENT_LENGTH
            || name == header::HOST
            || name == X_FORWARDED_FOR
            || name == X_FORWARDED_PROTO
            || name == X_FORWARDED_HOST
            || name == X_USER_ID
            || dropped.iter().any(|d| d == name.as_str())
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(addr) = ctx.client_addr {
        insert_str(&mut headers, X_FORWARDED_FOR, &addr.ip().to_string());
    }
    insert_str(&mut headers, X_FORWARDED_PROTO, &ctx.scheme);
    if let Some(host) = &ctx.host {
        insert_str(&mut headers, X_FORWARDED_HOST, host);
    }
    insert_str(&mut headers, crate::http::X_REQUEST_ID, ctx.request_id.as_str());
    if let Some(user_id) = ctx.user_id() {
        insert_str(&mut headers, X_USER_ID, user_id);
    }
    if let Some(token) = ctx.bearer_token() {
        insert_str(&mut headers, header::AUTHORIZATION, &format!("Bearer {}", token));
    }

    headers
}

/// Remove hop-by-hop headers from a backend response before relaying it.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for token in connection_tokens(headers) {
        headers.remove(token.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(header = %name, "Skipping header with invalid value"),
    }
}
