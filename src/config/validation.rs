//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate backend URLs and health paths
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Refuse to start without a token signing secret
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret must be set (or JWT_SECRET_KEY)")]
    MissingJwtSecret,

    #[error("unsupported JWT algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("service '{service}' has invalid url '{url}': {reason}")]
    InvalidServiceUrl {
        service: String,
        url: String,
        reason: String,
    },

    #[error("service '{0}' health_path must start with '/'")]
    InvalidHealthPath(String),

    #[error("service '{0}' circuit_breaker_threshold must be greater than 0")]
    InvalidBreakerThreshold(String),

    #[error("{0} must be greater than 0")]
    NonPositive(&'static str),

    #[error("timeouts.max_secs must not be below timeouts.default_secs")]
    TimeoutBounds,

    #[error("retries.budget_ratio must be within 0.0..=1.0")]
    InvalidRetryBudget,
}

const SUPPORTED_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.trim().is_empty() {
        errors.push(ValidationError::MissingJwtSecret);
    }
    if !SUPPORTED_ALGORITHMS.contains(&config.auth.jwt_algorithm.as_str()) {
        errors.push(ValidationError::UnsupportedAlgorithm(
            config.auth.jwt_algorithm.clone(),
        ));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    for (service, endpoint) in &config.services {
        for url in endpoint.instance_urls() {
            if let Err(reason) = check_backend_url(&url) {
                errors.push(ValidationError::InvalidServiceUrl {
                    service: service.to_string(),
                    url,
                    reason,
                });
            }
        }
        if !endpoint.health_path.starts_with('/') {
            errors.push(ValidationError::InvalidHealthPath(service.to_string()));
        }
        if endpoint.circuit_breaker_threshold == 0 {
            errors.push(ValidationError::InvalidBreakerThreshold(service.to_string()));
        }
    }

    let positives = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.default_secs", config.timeouts.default_secs),
        ("discovery.sweep_interval_secs", config.discovery.sweep_interval_secs),
        ("discovery.probe_timeout_secs", config.discovery.probe_timeout_secs),
        ("discovery.max_failures", config.discovery.max_failures as u64),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("security.max_body_size", config.security.max_body_size as u64),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::NonPositive(field));
        }
    }
    if config.rate_limit.enabled && config.rate_limit.requests == 0 {
        errors.push(ValidationError::NonPositive("rate_limit.requests"));
    }

    if config.timeouts.max_secs < config.timeouts.default_secs {
        errors.push(ValidationError::TimeoutBounds);
    }
    if !(0.0..=1.0).contains(&config.retries.budget_ratio) {
        errors.push(ValidationError::InvalidRetryBudget);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_backend_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("scheme '{}' is not supported", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
