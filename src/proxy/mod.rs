//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway handler (service name, tail path)
//!     → dispatcher.rs (resolve descriptor, normalize path, buffer body)
//!     → context.rs (request id, identity, client address)
//!     → security::headers (outbound header set)
//!     → registry instance → circuit breaker → HTTP client (with deadline)
//!     → backend response relayed unchanged, or error.rs mapping
//! ```
//!
//! # Design Decisions
//! - Backend-returned statuses are passed through and never trip a breaker
//! - Only unreachability, timeouts and broken exchanges count as failures
//! - Error bodies are JSON `{"detail": ...}`

pub mod context;
pub mod dispatcher;
pub mod error;

pub use context::ProxyRequestContext;
pub use dispatcher::Dispatcher;
pub use error::{ProxyError, UpstreamFailure};
