//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (bearer JWT or API key, excluded paths pass)
//!     → rate_limit.rs (sliding window per client identity)
//!     → Pass to proxy
//!
//! Outgoing request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*, identity headers)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input (forwarding headers are rebuilt)

pub mod auth;
pub mod headers;
pub mod rate_limit;

pub use auth::{AuthError, Authenticator, Principal};
pub use rate_limit::{RateDecision, RateLimiter};
