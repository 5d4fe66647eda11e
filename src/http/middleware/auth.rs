//! Authentication middleware.
//! Attaches the caller's `Principal` or rejects the request.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::http::RequestIdExt;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let decision = {
        let authenticator = state.authenticator.load();
        authenticator.authorize(request.uri().path(), request.headers())
    };

    match decision {
        Ok(principal) => {
            if let Some(principal) = principal.clone() {
                request.extensions_mut().insert(principal);
            }
            let mut response = next.run(request).await;
            // Surfaced to the access log, which sits outside this layer.
            if let Some(principal) = principal {
                response.extensions_mut().insert(principal);
            }
            response
        }
        Err(e) => {
            tracing::warn!(
                request_id = request.request_id().map(|id| id.as_str()).unwrap_or("-"),
                path = %request.uri().path(),
                reason = %e,
                "Authentication failed"
            );
            e.into_response()
        }
    }
}
