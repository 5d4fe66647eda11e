//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{GatewayConfig, ServiceEndpointConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::ServiceName;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finalize(config, |key| std::env::var(key).ok())
}

/// Build configuration from defaults and environment variables only.
pub fn load_default() -> Result<GatewayConfig, ConfigError> {
    finalize(GatewayConfig::default(), |key| std::env::var(key).ok())
}

/// Normalize, override, and validate a parsed configuration.
pub fn finalize<F>(mut config: GatewayConfig, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, &env);

    for (service, endpoint) in config.services.iter_mut() {
        if endpoint.name.is_empty() {
            endpoint.name = format!("{}-service", service);
        }
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `JWT_SECRET_KEY`, `JWT_ALGORITHM`, `GATEWAY_BIND_ADDRESS`,
/// `LOAD_BALANCING_STRATEGY` and the per-service `*_SERVICE_URL` variables.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = env("JWT_SECRET_KEY") {
        config.auth.jwt_secret = secret;
    }
    if let Some(algorithm) = env("JWT_ALGORITHM") {
        config.auth.jwt_algorithm = algorithm;
    }
    if let Some(addr) = env("GATEWAY_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }
    if let Some(strategy) = env("LOAD_BALANCING_STRATEGY") {
        match strategy.parse() {
            Ok(strategy) => config.discovery.strategy = strategy,
            Err(e) => tracing::warn!(error = %e, "Ignoring LOAD_BALANCING_STRATEGY"),
        }
    }

    for service in ServiceName::ALL {
        if let Some(url) = env(service.url_env_var()) {
            config
                .services
                .entry(service)
                .and_modify(|endpoint| endpoint.url = url.clone())
                .or_insert_with(|| ServiceEndpointConfig::new(service, url));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::LoadBalancingStrategy;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = finalize(
            GatewayConfig::default(),
            env_from(&[
                ("JWT_SECRET_KEY", "from-env"),
                ("NIN_SERVICE_URL", "http://nin.internal:9000"),
                ("LOAD_BALANCING_STRATEGY", "random"),
            ]),
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.services[&ServiceName::Nin].url, "http://nin.internal:9000");
        assert_eq!(config.discovery.strategy, LoadBalancingStrategy::Random);
    }

    #[test]
    fn missing_secret_is_rejected() {
        let err = finalize(GatewayConfig::default(), env_from(&[])).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.contains(&ValidationError::MissingJwtSecret));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unnamed_services_get_default_names() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [services.bvn]
            url = "http://127.0.0.1:8006"
            "#,
        )
        .unwrap();
        let config = finalize(config, env_from(&[("JWT_SECRET_KEY", "k")])).unwrap();
        assert_eq!(config.services[&ServiceName::Bvn].name, "bvn-service");
    }

    #[test]
    fn service_url_env_adds_missing_service() {
        let mut config = GatewayConfig::default();
        config.services.clear();
        apply_env_overrides(&mut config, &env_from(&[("SMS_SERVICE_URL", "http://sms:8003")]));
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[&ServiceName::Sms].name, "sms-service");
    }
}
