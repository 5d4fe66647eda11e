//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{instance::ServiceInstance, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through the healthy instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        Some(instances[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ServiceName;

    fn instances(n: u16) -> Vec<Arc<ServiceInstance>> {
        (0..n)
            .map(|i| {
                Arc::new(
                    ServiceInstance::new(ServiceName::Sms, &format!("http://127.0.0.1:{}", 9000 + i), "/health")
                        .unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn visits_each_instance_once_then_wraps() {
        let lb = RoundRobin::new();
        let pool = instances(3);

        let picked: Vec<String> = (0..3)
            .map(|_| lb.select(&pool).unwrap().url().to_string())
            .collect();
        let mut unique = picked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        assert_eq!(lb.select(&pool).unwrap().url(), picked[0]);
    }

    #[test]
    fn empty_pool() {
        assert!(RoundRobin::new().select(&[]).is_none());
    }
}
