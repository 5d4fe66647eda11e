//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (/api/v1/{service}/{*path})
//!     → service.rs (parse service segment into ServiceName)
//!     → path.rs (normalize into the backend's versioned namespace)
//!     → Return: (ServiceName, upstream path) or UnknownService
//! ```
//!
//! # Design Decisions
//! - Closed service set, no string-keyed dispatch past the edge
//! - Deterministic: same input always maps to the same upstream path
//! - Unknown services are a client error (404), never a backend failure

pub mod path;
pub mod service;

pub use path::{upstream_path, with_query};
pub use service::{ServiceName, UnknownService};
