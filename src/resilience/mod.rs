//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (resolve per-service deadline)
//!     → circuit_breaker.rs (admit, fail fast, or probe)
//!     → On connect failure: retries.rs (idempotent + budget), backoff.rs (delay)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)
//! - Circuit breaker prevents cascading failures and never retries itself
//! - Breakers are owned by an injected manager, never a global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::Backoff;
pub use circuit_breaker::{
    BreakerSettings, CircuitBreaker, CircuitBreakerError, CircuitBreakerManager,
    CircuitBreakerSnapshot, CircuitState,
};
pub use retries::{is_idempotent, RetryBudget};
pub use timeouts::effective_timeout;
