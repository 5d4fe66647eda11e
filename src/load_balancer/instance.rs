//! Service instance abstraction.
//!
//! # Responsibilities
//! - Represent one network-addressable deployment of a logical service
//! - Track health (consecutive failures, healthy flag)
//! - Track last observed response time (for least-response-time selection)

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::time::Instant;
use url::Url;

use crate::routing::ServiceName;

/// A single backend instance.
#[derive(Debug)]
pub struct ServiceInstance {
    /// Logical service this instance belongs to.
    pub service: ServiceName,
    /// Base URL without a trailing slash.
    base_url: String,
    /// Path probed by health checks.
    pub health_path: String,

    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    /// Last observed response time in microseconds (0 = never observed).
    response_time_micros: AtomicU64,
    last_health_check: Mutex<Option<(Instant, SystemTime)>>,
}

/// Diagnostics for one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub url: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub response_time_ms: f64,
    /// Unix seconds of the last probe.
    pub last_health_check: Option<u64>,
}

impl ServiceInstance {
    /// Create an instance, validating the base URL.
    pub fn new(service: ServiceName, url: &str, health_path: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Self {
            service,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            health_path: health_path.to_string(),
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            response_time_micros: AtomicU64::new(0),
            last_health_check: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path_and_query` on this instance.
    pub fn endpoint(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    pub fn health_url(&self) -> String {
        self.endpoint(&self.health_path)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Last observed response time; zero when none has been observed yet.
    pub fn response_time(&self) -> Duration {
        Duration::from_micros(self.response_time_micros.load(Ordering::Relaxed))
    }

    /// Report a successful probe or exchange. Returns true if the instance
    /// just recovered.
    pub fn record_success(&self, response_time: Duration) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.response_time_micros
            .store(response_time.as_micros() as u64, Ordering::Relaxed);
        !self.healthy.swap(true, Ordering::Relaxed)
    }

    /// Report a failed probe or exchange. Returns true if this failure
    /// marked the instance unhealthy.
    pub fn record_failure(&self, max_failures: u32) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= max_failures {
            return self.healthy.swap(false, Ordering::Relaxed);
        }
        false
    }

    pub fn mark_checked(&self) {
        let mut last = self
            .last_health_check
            .lock()
            .expect("instance health mutex poisoned");
        *last = Some((Instant::now(), SystemTime::now()));
    }

    /// True when the last probe is older than `interval` (or never happened).
    pub fn is_due(&self, interval: Duration) -> bool {
        let last = self
            .last_health_check
            .lock()
            .expect("instance health mutex poisoned");
        last.map_or(true, |(at, _)| at.elapsed() >= interval)
    }

    pub fn status(&self) -> InstanceStatus {
        let last = *self
            .last_health_check
            .lock()
            .expect("instance health mutex poisoned");
        InstanceStatus {
            url: self.base_url.clone(),
            healthy: self.is_healthy(),
            consecutive_failures: self.consecutive_failures(),
            response_time_ms: self.response_time().as_secs_f64() * 1000.0,
            last_health_check: last
                .and_then(|(_, wall)| wall.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
        }
    }
}
