//! Caller authentication.
//!
//! # Responsibilities
//! - Verify `Authorization: Bearer <jwt>` with the configured HMAC secret
//! - Accept well-formed `X-API-Key` credentials
//! - Skip enforcement on excluded path prefixes
//!
//! # Design Decisions
//! - Backends re-verify tokens themselves; the gateway only gates and forwards
//! - `exp` is validated when present but not required
//! - Credentials never appear in logs or error bodies

use std::str::FromStr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::AuthConfig;

pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Identity established for a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Principal {
    /// Bearer token holder; `token` is forwarded to backends.
    User { user_id: Option<String>, token: String },
    ApiKey { key: String },
}

impl Principal {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Principal::User { user_id, .. } => user_id.as_deref(),
            Principal::ApiKey { .. } => None,
        }
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Principal::User { token, .. } => Some(token),
            Principal::ApiKey { .. } => None,
        }
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::User { user_id, .. } => f
                .debug_struct("User")
                .field("user_id", user_id)
                .finish_non_exhaustive(),
            Principal::ApiKey { .. } => f.write_str("ApiKey"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingCredentials,

    #[error("Invalid authorization header format")]
    InvalidHeaderFormat,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid API key")]
    InvalidApiKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Verifies caller credentials.
pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    excluded_paths: Vec<String>,
    api_key_prefix: String,
    api_key_min_length: usize,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Result<Self, jsonwebtoken::errors::Error> {
        let algorithm = Algorithm::from_str(&config.jwt_algorithm)?;
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            excluded_paths: config.excluded_paths.clone(),
            api_key_prefix: config.api_key_prefix.clone(),
            api_key_min_length: config.api_key_min_length,
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Option<String>, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token verification failed");
                AuthError::InvalidToken
            })
    }

    pub fn validate_api_key(&self, key: &str) -> bool {
        key.starts_with(&self.api_key_prefix) && key.len() >= self.api_key_min_length
    }

    /// Resolve credentials present on a request. A bearer token takes
    /// precedence over an API key.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Principal>, AuthError> {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let value = value.to_str().map_err(|_| AuthError::InvalidHeaderFormat)?;
            let token = value
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or(AuthError::InvalidHeaderFormat)?;
            let user_id = self.verify_token(token)?;
            return Ok(Some(Principal::User {
                user_id,
                token: token.to_string(),
            }));
        }

        if let Some(value) = headers.get(X_API_KEY) {
            let key = value.to_str().map_err(|_| AuthError::InvalidApiKey)?;
            if !self.validate_api_key(key) {
                return Err(AuthError::InvalidApiKey);
            }
            return Ok(Some(Principal::ApiKey {
                key: key.to_string(),
            }));
        }

        Ok(None)
    }

    /// Decide whether a request to `path` may proceed.
    ///
    /// Excluded paths always pass, picking up an identity when valid
    /// credentials happen to be present.
    pub fn authorize(&self, path: &str, headers: &HeaderMap) -> Result<Option<Principal>, AuthError> {
        if self.is_excluded(path) {
            return Ok(self.authenticate(headers).ok().flatten());
        }
        match self.authenticate(headers)? {
            Some(principal) => Ok(Some(principal)),
            None => Err(AuthError::MissingCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn authenticator() -> Authenticator {
        let config = AuthConfig {
            jwt_secret: SECRET.into(),
            ..AuthConfig::default()
        };
        Authenticator::new(&config).unwrap()
    }

    fn token(sub: &str, secret: &str) -> String {
        encode(
            &Header::default(),
            &serde_json::json!({ "sub": sub }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn headers(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn valid_bearer_token_yields_user() {
        let auth = authenticator();
        let jwt = token("user-1", SECRET);
        let principal = auth
            .authorize("/api/v1/nin/verify", &headers("authorization", &format!("Bearer {jwt}")))
            .unwrap()
            .unwrap();
        assert_eq!(principal.user_id(), Some("user-1"));
        assert_eq!(principal.bearer_token(), Some(jwt.as_str()));
    }

    #[test]
    fn rejects_bad_credentials() {
        let auth = authenticator();
        let path = "/api/v1/sms/send";
        assert_eq!(auth.authorize(path, &HeaderMap::new()), Err(AuthError::MissingCredentials));
        assert_eq!(
            auth.authorize(path, &headers("authorization", "Basic abc")),
            Err(AuthError::InvalidHeaderFormat)
        );
        let forged = token("user-1", "other-secret");
        assert_eq!(
            auth.authorize(path, &headers("authorization", &format!("Bearer {forged}"))),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            auth.authorize(path, &headers("x-api-key", "sk-short")),
            Err(AuthError::InvalidApiKey)
        );
    }

    #[test]
    fn accepts_api_keys() {
        let auth = authenticator();
        let principal = auth
            .authorize("/api/v1/ai/chat", &headers("x-api-key", "sk-0123456789abcdefghij"))
            .unwrap();
        assert!(matches!(principal, Some(Principal::ApiKey { .. })));
    }

    #[test]
    fn excluded_paths_pass_without_credentials() {
        let auth = authenticator();
        assert_eq!(auth.authorize("/health", &HeaderMap::new()), Ok(None));
        assert_eq!(auth.authorize("/api/v1/auth/login", &headers("authorization", "junk")), Ok(None));
        assert_eq!(auth.authorize("/.well-known/jwks.json", &HeaderMap::new()), Ok(None));
    }

    #[test]
    fn debug_hides_credentials() {
        let principal = Principal::User {
            user_id: Some("u".into()),
            token: "secret-token".into(),
        };
        assert!(!format!("{principal:?}").contains("secret-token"));
    }
}
