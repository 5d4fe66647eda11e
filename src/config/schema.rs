//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::load_balancer::LoadBalancingStrategy;
use crate::routing::ServiceName;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend services keyed by logical name.
    pub services: BTreeMap<ServiceName, ServiceEndpointConfig>,

    /// Service discovery and health probing.
    pub discovery: DiscoveryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Caller authentication.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request limits.
    pub security: SecurityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let services = [
            (ServiceName::Auth, "http://127.0.0.1:8000"),
            (ServiceName::Config, "http://127.0.0.1:8001"),
            (ServiceName::Ai, "http://127.0.0.1:8002"),
            (ServiceName::Sms, "http://127.0.0.1:8003"),
            (ServiceName::Nin, "http://127.0.0.1:8005"),
            (ServiceName::Bvn, "http://127.0.0.1:8006"),
        ]
        .into_iter()
        .map(|(service, url)| (service, ServiceEndpointConfig::new(service, url)))
        .collect();

        Self {
            listener: ListenerConfig::default(),
            services,
            discovery: DiscoveryConfig::default(),
            timeouts: TimeoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retries: RetryConfig::default(),
            auth: AuthConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Static descriptor for one backend service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceEndpointConfig {
    /// Human readable name used in logs (e.g., "auth-service").
    #[serde(default)]
    pub name: String,

    /// Primary base URL (e.g., "http://127.0.0.1:8000").
    pub url: String,

    /// Additional instance base URLs load balanced alongside `url`.
    #[serde(default)]
    pub instances: Vec<String>,

    /// Path probed by health checks.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Per-request timeout in seconds (0 = use the global default).
    #[serde(default = "default_service_timeout")]
    pub timeout: u64,

    /// Extra attempts for idempotent requests that fail to connect.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Failures before the circuit opens.
    #[serde(default = "default_cb_threshold")]
    pub circuit_breaker_threshold: u32,

    /// Seconds the circuit stays open before a probe is allowed.
    #[serde(default = "default_cb_timeout")]
    pub circuit_breaker_timeout: u64,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_service_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_cb_threshold() -> u32 {
    5
}

fn default_cb_timeout() -> u64 {
    60
}

impl ServiceEndpointConfig {
    /// Create a descriptor with default thresholds for `service` at `url`.
    pub fn new(service: ServiceName, url: impl Into<String>) -> Self {
        Self {
            name: format!("{}-service", service),
            url: url.into(),
            instances: Vec::new(),
            health_path: default_health_path(),
            timeout: default_service_timeout(),
            retries: default_retries(),
            circuit_breaker_threshold: default_cb_threshold(),
            circuit_breaker_timeout: default_cb_timeout(),
        }
    }

    /// Primary URL followed by any extra instances, deduplicated.
    pub fn instance_urls(&self) -> Vec<String> {
        let mut urls = vec![self.url.clone()];
        for url in &self.instances {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout)
    }
}

/// Service discovery and health probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Run the periodic health monitor.
    pub enabled: bool,

    /// Instance selection policy.
    pub strategy: LoadBalancingStrategy,

    /// Minimum age of an instance's last probe before it is probed again.
    pub health_check_interval_secs: u64,

    /// How often the monitor wakes up to sweep instances.
    pub sweep_interval_secs: u64,

    /// Timeout for a single health probe.
    pub probe_timeout_secs: u64,

    /// Consecutive failed probes before an instance is marked unhealthy.
    pub max_failures: u32,

    /// How long the aggregated `/services/health` report is cached.
    pub report_cache_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: LoadBalancingStrategy::RoundRobin,
            health_check_interval_secs: 30,
            sweep_interval_secs: 30,
            probe_timeout_secs: 10,
            max_failures: 3,
            report_cache_secs: 30,
        }
    }
}

/// Timeout configuration for backend calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout used when a service does not set one.
    pub default_secs: u64,

    /// Upper bound for any per-service timeout.
    pub max_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            default_secs: 30,
            max_secs: 300,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per client within one window.
    pub requests: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 100,
            window_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Percentage of requests that can be retries (retry budget).
    /// e.g., 0.1 for 10% budget.
    pub budget_ratio: f32,

    /// Retries always allowed regardless of traffic volume.
    pub min_retries: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            budget_ratio: 0.1,
            min_retries: 10,
        }
    }
}

/// Caller authentication configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to verify bearer tokens. Required.
    pub jwt_secret: String,

    /// JWT algorithm (HS256, HS384, HS512).
    pub jwt_algorithm: String,

    /// Path prefixes that do not require credentials.
    pub excluded_paths: Vec<String>,

    /// Required prefix for API keys.
    pub api_key_prefix: String,

    /// Minimum API key length.
    pub api_key_min_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_algorithm: "HS256".to_string(),
            excluded_paths: vec![
                "/health".to_string(),
                "/metrics".to_string(),
                "/api/v1/auth/register".to_string(),
                "/api/v1/auth/login".to_string(),
                "/.well-known/".to_string(),
            ],
            api_key_prefix: "sk-".to_string(),
            api_key_min_length: 21,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("excluded_paths", &self.excluded_paths)
            .field("api_key_prefix", &self.api_key_prefix)
            .field("api_key_min_length", &self.api_key_min_length)
            .finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the `/metrics` endpoint.
    pub metrics_enabled: bool,

    /// Emit one structured event per request.
    pub access_log_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            access_log_enabled: true,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
