//! Active health checking.
//!
//! # Responsibilities
//! - Periodically sweep the registry
//! - Stop cleanly on shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::health::probe::HealthProber;
use crate::load_balancer::ServiceRegistry;

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    prober: HealthProber,
    sweep_interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, prober: HealthProber, sweep_interval: Duration) -> Self {
        Self {
            registry,
            prober,
            sweep_interval,
        }
    }

    /// Sweep until a shutdown signal arrives. A sweep in progress is dropped
    /// at shutdown; each probe only touches its own instance.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.registry.health_check_all(&self.prober) => {}
                        _ = shutdown.recv() => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Health monitor received shutdown signal, exiting loop");
    }
}
