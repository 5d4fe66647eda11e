//! Edge middleware.

pub mod access_log;
pub mod auth;

pub use access_log::{access_log_middleware, X_PROCESS_TIME};
pub use auth::auth_middleware;
