//! Uniform random load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{instance::ServiceInstance, LoadBalancer};

#[derive(Debug, Default)]
pub struct Random;

impl LoadBalancer for Random {
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }
        Some(instances[fastrand::usize(..instances.len())].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ServiceName;

    #[test]
    fn picks_from_given_instances() {
        let pool: Vec<Arc<ServiceInstance>> = (0..3)
            .map(|i| {
                Arc::new(
                    ServiceInstance::new(ServiceName::Ai, &format!("http://127.0.0.1:{}", 7000 + i), "/health")
                        .unwrap(),
                )
            })
            .collect();

        for _ in 0..20 {
            let picked = Random.select(&pool).unwrap();
            assert!(pool.iter().any(|i| Arc::ptr_eq(i, &picked)));
        }
        assert!(Random.select(&[]).is_none());
    }
}
