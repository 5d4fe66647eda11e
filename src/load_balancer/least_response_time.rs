//! Least response time load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{instance::ServiceInstance, LoadBalancer};

/// Selects the instance with the lowest last observed response time.
/// Instances never observed report zero and are therefore tried first.
#[derive(Debug, Default)]
pub struct LeastResponseTime;

impl LeastResponseTime {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastResponseTime {
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        // In case of tie, the first one is selected (stability)
        instances.iter().min_by_key(|i| i.response_time()).cloned()
    }
}
