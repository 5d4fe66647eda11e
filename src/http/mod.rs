//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack, background tasks)
//!     → request.rs (assign request ID)
//!     → middleware/access_log.rs (timing, metrics, one event per request)
//!     → middleware/auth.rs (credentials → Principal)
//!     → security::rate_limit (per-client sliding window)
//!     → handlers.rs (proxy or observability endpoint)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use request::{request_id_middleware, RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
