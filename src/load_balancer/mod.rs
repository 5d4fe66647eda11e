//! Load balancing and service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher asks for an instance of a ServiceName
//!     → registry.rs (look up the service's instance group)
//!     → filter healthy instances (fail open to the first instance if none)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through healthy instances)
//!         - least_response_time.rs (pick the fastest responder)
//!         - random.rs (uniform choice)
//!     → Return Arc<ServiceInstance>
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless apart from their own counters; instances track health
//! - One instance group (and one balancer) per service, never a global lock
//! - Unhealthy instances excluded from selection
//! - The circuit breaker, not the registry, is the safety net for dead services

pub mod instance;
pub mod least_response_time;
pub mod random;
pub mod registry;
pub mod round_robin;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use instance::{InstanceStatus, ServiceInstance};
pub use registry::{RegistryError, RegistrySettings, RegistryStatus, ServiceRegistry, ServiceStatus};

/// Instance selection policy.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Pick one of `instances` (already filtered to healthy ones).
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>>;
}

/// Configurable strategy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    #[default]
    RoundRobin,
    #[serde(alias = "least_connections")]
    LeastResponseTime,
    Random,
}

impl LoadBalancingStrategy {
    pub fn build(&self) -> Box<dyn LoadBalancer> {
        match self {
            LoadBalancingStrategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            LoadBalancingStrategy::LeastResponseTime => {
                Box::new(least_response_time::LeastResponseTime::new())
            }
            LoadBalancingStrategy::Random => Box::new(random::Random),
        }
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" => Ok(Self::RoundRobin),
            "least_response_time" | "least_connections" => Ok(Self::LeastResponseTime),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown load balancing strategy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_names() {
        assert_eq!("round_robin".parse(), Ok(LoadBalancingStrategy::RoundRobin));
        assert_eq!("least_connections".parse(), Ok(LoadBalancingStrategy::LeastResponseTime));
        assert_eq!("Random".parse(), Ok(LoadBalancingStrategy::Random));
        assert!("weighted".parse::<LoadBalancingStrategy>().is_err());
    }
}
