//! Service registry.
//!
//! # Responsibilities
//! - Manage instance groups keyed by logical service
//! - Apply the configured load balancing algorithm to healthy instances
//! - Run health sweeps over due instances and expose status snapshots

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;

use crate::config::{DiscoveryConfig, ServiceEndpointConfig};
use crate::health::probe::{HealthProber, ProbeOutcome};
use crate::load_balancer::{
    instance::{InstanceStatus, ServiceInstance},
    LoadBalancer, LoadBalancingStrategy,
};
use crate::observability::metrics;
use crate::routing::ServiceName;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid instance url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("service '{0}' is not registered")]
    UnknownService(ServiceName),

    #[error("instance '{0}' is already registered")]
    DuplicateInstance(String),
}

/// Tunables shared by every group.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub strategy: LoadBalancingStrategy,
    pub health_check_interval: Duration,
    pub max_failures: u32,
}

impl From<&DiscoveryConfig> for RegistrySettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            strategy: config.strategy,
            health_check_interval: Duration::from_secs(config.health_check_interval_secs),
            max_failures: config.max_failures.max(1),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

#[derive(Debug)]
struct ServiceGroup {
    /// Configured URLs this group was seeded from.
    seeded_from: Vec<String>,
    health_path: String,
    instances: Vec<Arc<ServiceInstance>>,
    strategy: LoadBalancingStrategy,
    balancer: Box<dyn LoadBalancer>,
}

/// Per-service registry snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub instances: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub strategy: LoadBalancingStrategy,
    pub services: BTreeMap<ServiceName, ServiceStatus>,
}

/// Holds the known instances of every service.
#[derive(Debug)]
pub struct ServiceRegistry {
    groups: DashMap<ServiceName, ServiceGroup>,
    settings: ArcSwap<RegistrySettings>,
}

impl ServiceRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            groups: DashMap::new(),
            settings: ArcSwap::from_pointee(settings),
        }
    }

    /// Build a registry seeded from a service table.
    pub fn from_services(
        services: &BTreeMap<ServiceName, ServiceEndpointConfig>,
        settings: RegistrySettings,
    ) -> Result<Self, RegistryError> {
        let registry = Self::new(settings);
        for (service, config) in services {
            registry.register_service(*service, config)?;
        }
        Ok(registry)
    }

    /// Register (or replace) a service's instance group from its descriptor.
    pub fn register_service(
        &self,
        service: ServiceName,
        config: &ServiceEndpointConfig,
    ) -> Result<(), RegistryError> {
        let urls = config.instance_urls();
        let instances = urls
            .iter()
            .map(|url| new_instance(service, url, &config.health_path))
            .collect::<Result<Vec<_>, _>>()?;

        let strategy = self.settings.load().strategy;
        tracing::debug!(service = %service, instances = instances.len(), "Registered service");
        self.groups.insert(
            service,
            ServiceGroup {
                seeded_from: urls,
                health_path: config.health_path.clone(),
                instances,
                strategy,
                balancer: strategy.build(),
            },
        );
        Ok(())
    }

    /// Pick an instance of `service`.
    ///
    /// Healthy instances are chosen by the configured strategy. When none is
    /// healthy the first known instance is returned anyway.
    pub fn get_instance(&self, service: ServiceName) -> Option<Arc<ServiceInstance>> {
        let group = self.groups.get(&service)?;
        let healthy: Vec<Arc<ServiceInstance>> = group
            .instances
            .iter()
            .filter(|i| i.is_healthy())
            .cloned()
            .collect();

        if healthy.is_empty() {
            let fallback = group.instances.first().cloned();
            if let Some(instance) = &fallback {
                tracing::warn!(
                    service = %service,
                    instance = %instance.url(),
                    "No healthy instances, failing open"
                );
            }
            return fallback;
        }

        group.balancer.select(&healthy)
    }

    /// Instance an on-demand health check should look at: the first healthy
    /// one, else the first known one. Leaves the balancer untouched.
    pub fn health_check_target(&self, service: ServiceName) -> Option<Arc<ServiceInstance>> {
        let group = self.groups.get(&service)?;
        group
            .instances
            .iter()
            .find(|i| i.is_healthy())
            .or_else(|| group.instances.first())
            .cloned()
    }

    /// Add an instance to a registered service.
    pub fn add_instance(
        &self,
        service: ServiceName,
        url: &str,
    ) -> Result<Arc<ServiceInstance>, RegistryError> {
        let mut group = self
            .groups
            .get_mut(&service)
            .ok_or(RegistryError::UnknownService(service))?;

        let instance = new_instance(service, url, &group.health_path)?;
        if group.instances.iter().any(|i| i.url() == instance.url()) {
            return Err(RegistryError::DuplicateInstance(instance.url().to_string()));
        }

        tracing::info!(service = %service, instance = %instance.url(), "Instance added");
        group.instances.push(instance.clone());
        Ok(instance)
    }

    /// Remove an instance by base URL. Returns whether one was removed.
    pub fn remove_instance(&self, service: ServiceName, url: &str) -> bool {
        let Some(mut group) = self.groups.get_mut(&service) else {
            return false;
        };
        let url = url.trim_end_matches('/');
        let before = group.instances.len();
        group.instances.retain(|i| i.url() != url);
        let removed = group.instances.len() != before;
        if removed {
            tracing::info!(service = %service, instance = %url, "Instance removed");
        }
        removed
    }

    pub fn instances(&self, service: ServiceName) -> Vec<Arc<ServiceInstance>> {
        self.groups
            .get(&service)
            .map(|g| g.instances.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, service: ServiceName) -> bool {
        self.groups.contains_key(&service)
    }

    /// Report the outcome of a proxied exchange against `instance`.
    pub fn record_outcome(&self, instance: &ServiceInstance, outcome: Result<Duration, ()>) {
        match outcome {
            Ok(elapsed) => {
                if instance.record_success(elapsed) {
                    tracing::info!(service = %instance.service, instance = %instance.url(), "Instance recovered");
                    metrics::record_instance_health(instance.service, instance.url(), true);
                }
            }
            Err(()) => {
                if instance.record_failure(self.settings.load().max_failures) {
                    tracing::warn!(service = %instance.service, instance = %instance.url(), "Instance marked unhealthy");
                    metrics::record_instance_health(instance.service, instance.url(), false);
                }
            }
        }
    }

    /// Probe every instance whose last check is older than the configured
    /// interval. Probes run concurrently; a failing probe only affects its
    /// own instance.
    pub async fn health_check_all(&self, prober: &HealthProber) {
        let interval = self.settings.load().health_check_interval;
        let due: Vec<Arc<ServiceInstance>> = self
            .groups
            .iter()
            .flat_map(|g| g.instances.clone())
            .filter(|i| i.is_due(interval))
            .collect();

        if due.is_empty() {
            return;
        }
        tracing::debug!(instances = due.len(), "Running health sweep");

        join_all(due.iter().map(|instance| async move {
            let outcome = prober.probe(instance).await;
            instance.mark_checked();
            match outcome {
                ProbeOutcome::Healthy { elapsed } => self.record_outcome(instance, Ok(elapsed)),
                ProbeOutcome::Unhealthy { reason, .. } => {
                    tracing::debug!(
                        service = %instance.service,
                        instance = %instance.url(),
                        reason = %reason,
                        "Health probe failed"
                    );
                    self.record_outcome(instance, Err(()));
                }
            }
            metrics::record_instance_health(instance.service, instance.url(), instance.is_healthy());
        }))
        .await;
    }

    pub fn get_status(&self) -> RegistryStatus {
        let services = self
            .groups
            .iter()
            .map(|g| {
                let instances: Vec<InstanceStatus> = g.instances.iter().map(|i| i.status()).collect();
                let status = ServiceStatus {
                    total_instances: instances.len(),
                    healthy_instances: instances.iter().filter(|i| i.healthy).count(),
                    instances,
                };
                (*g.key(), status)
            })
            .collect();

        RegistryStatus {
            strategy: self.settings.load().strategy,
            services,
        }
    }

    /// Reconcile with a reloaded service table.
    ///
    /// Services whose URL set, health path or strategy changed are reseeded;
    /// untouched services keep their runtime health state.
    pub fn reload(
        &self,
        services: &BTreeMap<ServiceName, ServiceEndpointConfig>,
        settings: RegistrySettings,
    ) -> Result<(), RegistryError> {
        let strategy = settings.strategy;
        self.settings.store(Arc::new(settings));
        self.groups.retain(|service, _| services.contains_key(service));

        for (service, config) in services {
            let unchanged = self.groups.get(service).is_some_and(|g| {
                g.seeded_from == config.instance_urls()
                    && g.health_path == config.health_path
                    && g.strategy == strategy
            });
            if !unchanged {
                self.register_service(*service, config)?;
            }
        }
        tracing::info!(services = services.len(), "Service registry reloaded");
        Ok(())
    }
}

fn new_instance(
    service: ServiceName,
    url: &str,
    health_path: &str,
) -> Result<Arc<ServiceInstance>, RegistryError> {
    ServiceInstance::new(service, url, health_path)
        .map(Arc::new)
        .map_err(|source| RegistryError::InvalidUrl {
            url: url.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(urls: &[&str]) -> BTreeMap<ServiceName, ServiceEndpointConfig> {
        let mut config = ServiceEndpointConfig::new(ServiceName::Nin, urls[0]);
        config.instances = urls[1..].iter().map(|u| u.to_string()).collect();
        BTreeMap::from([(ServiceName::Nin, config)])
    }

    fn registry(urls: &[&str]) -> ServiceRegistry {
        ServiceRegistry::from_services(&services(urls), RegistrySettings::default()).unwrap()
    }

    #[test]
    fn round_robin_over_healthy_instances() {
        let reg = registry(&["http://a:1", "http://b:1", "http://c:1"]);
        let instances = reg.instances(ServiceName::Nin);
        for _ in 0..3 {
            instances[1].record_failure(3);
        }

        let picks: Vec<String> = (0..4)
            .map(|_| reg.get_instance(ServiceName::Nin).unwrap().url().to_string())
            .collect();
        assert!(!picks.contains(&"http://b:1".to_string()));
        assert_eq!(picks[0], picks[2]);
        assert_ne!(picks[0], picks[1]);
    }

    #[test]
    fn fails_open_to_first_instance() {
        let reg = registry(&["http://a:1", "http://b:1"]);
        for instance in reg.instances(ServiceName::Nin) {
            for _ in 0..3 {
                instance.record_failure(3);
            }
        }
        let picked = reg.get_instance(ServiceName::Nin).unwrap();
        assert_eq!(picked.url(), "http://a:1");
        assert!(!picked.is_healthy());
    }

    #[test]
    fn health_check_target_does_not_advance_rotation() {
        let reg = registry(&["http://a:1", "http://b:1", "http://c:1"]);
        reg.instances(ServiceName::Nin)[0].record_failure(1);

        let first = reg.get_instance(ServiceName::Nin).unwrap();
        for _ in 0..5 {
            let target = reg.health_check_target(ServiceName::Nin).unwrap();
            assert_eq!(target.url(), "http://b:1");
        }
        let second = reg.get_instance(ServiceName::Nin).unwrap();

        assert_eq!(first.url(), "http://b:1");
        assert_eq!(second.url(), "http://c:1");
        assert!(reg.health_check_target(ServiceName::Sms).is_none());
    }

    #[test]
    fn unknown_or_empty_service_yields_none() {
        let reg = registry(&["http://a:1"]);
        assert!(reg.get_instance(ServiceName::Sms).is_none());
        assert!(reg.remove_instance(ServiceName::Nin, "http://a:1/"));
        assert!(reg.get_instance(ServiceName::Nin).is_none());
    }

    #[test]
    fn add_instance_rejects_duplicates_and_unknown_services() {
        let reg = registry(&["http://a:1"]);
        reg.add_instance(ServiceName::Nin, "http://b:1").unwrap();
        assert_eq!(reg.instances(ServiceName::Nin).len(), 2);
        assert!(matches!(
            reg.add_instance(ServiceName::Nin, "http://b:1/"),
            Err(RegistryError::DuplicateInstance(_))
        ));
        assert!(matches!(
            reg.add_instance(ServiceName::Ai, "http://c:1"),
            Err(RegistryError::UnknownService(ServiceName::Ai))
        ));
        assert!(matches!(
            reg.add_instance(ServiceName::Nin, "not a url"),
            Err(RegistryError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn reload_keeps_untouched_state_and_reseeds_changed() {
        let reg = registry(&["http://a:1"]);
        let original = reg.instances(ServiceName::Nin)[0].clone();
        original.record_success(Duration::from_millis(5));

        reg.reload(&services(&["http://a:1"]), RegistrySettings::default()).unwrap();
        assert!(Arc::ptr_eq(&original, &reg.instances(ServiceName::Nin)[0]));

        reg.reload(&services(&["http://a:1", "http://b:1"]), RegistrySettings::default())
            .unwrap();
        assert_eq!(reg.instances(ServiceName::Nin).len(), 2);
        assert!(!Arc::ptr_eq(&original, &reg.instances(ServiceName::Nin)[0]));

        reg.reload(&BTreeMap::new(), RegistrySettings::default()).unwrap();
        assert!(!reg.contains(ServiceName::Nin));
    }

    #[test]
    fn status_counts_healthy_instances() {
        let reg = registry(&["http://a:1", "http://b:1"]);
        for _ in 0..3 {
            reg.record_outcome(&reg.instances(ServiceName::Nin)[0], Err(()));
        }
        let status = reg.get_status();
        let nin = &status.services[&ServiceName::Nin];
        assert_eq!(nin.total_instances, 2);
        assert_eq!(nin.healthy_instances, 1);
    }
}
