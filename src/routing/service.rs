//! Logical service identifiers.
//!
//! # Design Decisions
//! - The set of backends is closed: one enum variant per logical service
//! - Strings are parsed into `ServiceName` only at the edges (config keys, URL segments)
//! - `llm` is accepted as an alias for the AI service

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logical backend service fronted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Auth,
    Config,
    Nin,
    Bvn,
    Sms,
    #[serde(alias = "llm")]
    Ai,
}

impl ServiceName {
    /// Every service known to the gateway.
    pub const ALL: [ServiceName; 6] = [
        ServiceName::Auth,
        ServiceName::Config,
        ServiceName::Nin,
        ServiceName::Bvn,
        ServiceName::Sms,
        ServiceName::Ai,
    ];

    /// Path segment and config key for this service.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Auth => "auth",
            ServiceName::Config => "config",
            ServiceName::Nin => "nin",
            ServiceName::Bvn => "bvn",
            ServiceName::Sms => "sms",
            ServiceName::Ai => "ai",
        }
    }

    /// Environment variable overriding this service's base URL.
    pub fn url_env_var(&self) -> &'static str {
        match self {
            ServiceName::Auth => "AUTH_SERVICE_URL",
            ServiceName::Config => "CONFIG_SERVICE_URL",
            ServiceName::Nin => "NIN_SERVICE_URL",
            ServiceName::Bvn => "BVN_SERVICE_URL",
            ServiceName::Sms => "SMS_SERVICE_URL",
            ServiceName::Ai => "AI_SERVICE_URL",
        }
    }

    /// The versioned namespace every backend mounts its API under.
    pub fn api_prefix(&self) -> String {
        format!("/api/v1/{}", self.as_str())
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Service '{0}' not found")]
pub struct UnknownService(pub String);

impl FromStr for ServiceName {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Ok(ServiceName::Auth),
            "config" => Ok(ServiceName::Config),
            "nin" => Ok(ServiceName::Nin),
            "bvn" => Ok(ServiceName::Bvn),
            "sms" => Ok(ServiceName::Sms),
            "ai" | "llm" => Ok(ServiceName::Ai),
            _ => Err(UnknownService(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_services_case_insensitively() {
        assert_eq!("auth".parse::<ServiceName>(), Ok(ServiceName::Auth));
        assert_eq!("SMS".parse::<ServiceName>(), Ok(ServiceName::Sms));
        assert_eq!("llm".parse::<ServiceName>(), Ok(ServiceName::Ai));
    }

    #[test]
    fn rejects_unknown_service() {
        let err = "payments".parse::<ServiceName>().unwrap_err();
        assert_eq!(err.to_string(), "Service 'payments' not found");
    }

    #[test]
    fn display_matches_config_key() {
        for service in ServiceName::ALL {
            assert_eq!(service.to_string().parse::<ServiceName>(), Ok(service));
        }
    }
}
