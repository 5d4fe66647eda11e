//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → ServiceRegistry::health_check_all
//!     → probe.rs (GET health_path, 200 = healthy)
//!     → ServiceInstance failure counter / healthy flag
//!
//! Passive accounting (proxy dispatcher):
//!     Exchange completed or backend unreachable
//!     → ServiceRegistry::record_outcome
//!
//! Reporting (report.rs):
//!     /services/health → cached aggregate of per-service probes
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - Unhealthy only after consecutive failures; one success recovers
//! - Health state is per-instance, not per-service

pub mod active;
pub mod probe;
pub mod report;

pub use active::HealthMonitor;
pub use probe::{HealthProber, ProbeOutcome};
pub use report::{HealthReport, HealthReporter, HealthStatus, OverallStatus, ServiceHealth};
