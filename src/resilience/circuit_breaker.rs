//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: first call after recovery timeout (evaluated lazily)
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), owned by `CircuitBreakerManager`
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open; a dropped probe releases its slot
//! - `failure_count` accumulates until the breaker closes again

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::ServiceEndpointConfig;
use crate::observability::metrics;
use crate::routing::ServiceName;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ServiceEndpointConfig> for BreakerSettings {
    fn from(config: &ServiceEndpointConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call without running the operation.
    #[error("circuit breaker for '{service}' is open")]
    Open { service: ServiceName },

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker, served by the observability endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub service: ServiceName,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    /// Unix seconds.
    pub last_failure_time: Option<u64>,
    /// Unix seconds.
    pub last_success_time: Option<u64>,
    /// Percentage of requests counted as failures since the breaker last closed.
    pub failure_rate: f64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    settings: BreakerSettings,
    failure_count: u32,
    success_count: u64,
    total_requests: u64,
    rejected_requests: u64,
    last_failure: Option<Instant>,
    last_failure_wall: Option<SystemTime>,
    last_success_wall: Option<SystemTime>,
    probe_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Probe,
}

/// Per-service failure-tracking gate.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: ServiceName,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: ServiceName, settings: BreakerSettings) -> Self {
        Self {
            service,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                settings,
                failure_count: 0,
                success_count: 0,
                total_requests: 0,
                rejected_requests: 0,
                last_failure: None,
                last_failure_wall: None,
                last_success_wall: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn service(&self) -> ServiceName {
        self.service
    }

    /// Run `operation` under the breaker's protection.
    ///
    /// The operation is not invoked when the breaker is open, or when it is
    /// half-open and a probe is already in flight.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        match operation().await {
            Ok(value) => {
                permit.settle(true);
                Ok(value)
            }
            Err(e) => {
                permit.settle(false);
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    /// Current state without triggering the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Replace thresholds, keeping counters and state.
    pub fn reconfigure(&self, settings: BreakerSettings) {
        let mut inner = self.lock();
        if inner.settings != settings {
            tracing::info!(
                service = %self.service,
                failure_threshold = settings.failure_threshold,
                recovery_timeout_secs = settings.recovery_timeout.as_secs(),
                "Circuit breaker reconfigured"
            );
            inner.settings = settings;
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        let failure_rate = if inner.total_requests > 0 {
            inner.failure_count as f64 / inner.total_requests as f64 * 100.0
        } else {
            0.0
        };
        CircuitBreakerSnapshot {
            service: self.service,
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            rejected_requests: inner.rejected_requests,
            failure_threshold: inner.settings.failure_threshold,
            recovery_timeout_secs: inner.settings.recovery_timeout.as_secs(),
            last_failure_time: inner.last_failure_wall.and_then(unix_secs),
            last_success_time: inner.last_success_wall.and_then(unix_secs),
            failure_rate,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    fn acquire<E>(&self) -> Result<Permit<'_>, CircuitBreakerError<E>> {
        let mut inner = self.lock();
        let kind = match inner.state {
            CircuitState::Closed => PermitKind::Normal,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= inner.settings.recovery_timeout);
                if !elapsed {
                    inner.rejected_requests += 1;
                    return Err(CircuitBreakerError::Open {
                        service: self.service,
                    });
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.probe_in_flight = true;
                PermitKind::Probe
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.rejected_requests += 1;
                    return Err(CircuitBreakerError::Open {
                        service: self.service,
                    });
                }
                inner.probe_in_flight = true;
                PermitKind::Probe
            }
        };
        Ok(Permit {
            breaker: self,
            kind,
            settled: false,
        })
    }

    fn on_success(&self, kind: PermitKind) {
        let mut inner = self.lock();
        inner.success_count += 1;
        inner.total_requests += 1;
        inner.last_success_wall = Some(SystemTime::now());

        if kind == PermitKind::Probe {
            inner.probe_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                inner.failure_count = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, kind: PermitKind) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.total_requests += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_wall = Some(SystemTime::now());

        match (inner.state, kind) {
            (CircuitState::HalfOpen, PermitKind::Probe) => {
                inner.probe_in_flight = false;
                self.transition(&mut inner, CircuitState::Open);
            }
            (CircuitState::Closed, _) if inner.failure_count >= inner.settings.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn on_cancel(&self, kind: PermitKind) {
        if kind == PermitKind::Probe {
            let mut inner = self.lock();
            inner.probe_in_flight = false;
            tracing::debug!(service = %self.service, "Half-open probe cancelled");
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => tracing::warn!(
                service = %self.service,
                from = %from,
                failure_count = inner.failure_count,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(service = %self.service, "Circuit breaker half-open, probing")
            }
            CircuitState::Closed => {
                tracing::info!(service = %self.service, from = %from, "Circuit breaker closed")
            }
        }
        metrics::record_breaker_state(self.service, to);
    }
}

/// Admission ticket for one protected call.
///
/// Dropping an unsettled probe permit frees the half-open slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    kind: PermitKind,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.on_success(self.kind);
        } else {
            self.breaker.on_failure(self.kind);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_cancel(self.kind);
        }
    }
}

fn unix_secs(at: SystemTime) -> Option<u64> {
    at.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// Owns one breaker per service, created on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    breakers: DashMap<ServiceName, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the breaker for `service`, creating it with `settings` if absent.
    pub fn get_or_create(&self, service: ServiceName, settings: BreakerSettings) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service)
            .or_insert_with(|| {
                metrics::record_breaker_state(service, CircuitState::Closed);
                Arc::new(CircuitBreaker::new(service, settings))
            })
            .clone()
    }

    pub fn get(&self, service: ServiceName) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(&service).map(|b| b.value().clone())
    }

    /// Snapshots of every breaker created so far, ordered by service.
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by_key(|s| s.service);
        snapshots
    }

    /// Apply thresholds from a reloaded service table and drop breakers of
    /// services that are no longer configured.
    pub fn reconfigure(&self, services: &BTreeMap<ServiceName, ServiceEndpointConfig>) {
        self.breakers.retain(|service, _| services.contains_key(service));
        for entry in self.breakers.iter() {
            if let Some(config) = services.get(entry.key()) {
                entry.value().reconfigure(BreakerSettings::from(config));
            }
        }
    }
}
