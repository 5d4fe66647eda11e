//! Aggregated service health.
//!
//! # Responsibilities
//! - Shape per-service probe results for the observability endpoints
//! - Cache the aggregate report so scrapes do not fan out on every call

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::routing::ServiceName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Probe result for one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub service: ServiceName,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn unknown(service: ServiceName, error: impl Into<String>) -> Self {
        Self {
            service,
            status: HealthStatus::Unknown,
            url: None,
            response_time_ms: None,
            status_code: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub services: BTreeMap<ServiceName, ServiceHealth>,
    /// Unix seconds.
    pub checked_at: u64,
}

impl HealthReport {
    pub fn from_checks(checks: impl IntoIterator<Item = ServiceHealth>) -> Self {
        let services: BTreeMap<_, _> = checks.into_iter().map(|h| (h.service, h)).collect();
        let status = if services.values().all(|h| h.status == HealthStatus::Healthy) {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };
        let checked_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            status,
            services,
            checked_at,
        }
    }
}

/// Time-bounded cache around an aggregate health check.
#[derive(Debug)]
pub struct HealthReporter {
    ttl: Duration,
    cached: Mutex<Option<(Instant, HealthReport)>>,
}

impl HealthReporter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached report, running `refresh` when it is missing or stale.
    /// Concurrent callers wait for a single refresh.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> HealthReport
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HealthReport>,
    {
        let mut cached = self.cached.lock().await;
        if let Some((at, report)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return report.clone();
            }
        }
        let report = refresh().await;
        *cached = Some((Instant::now(), report.clone()));
        report
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
