//! Upstream path normalization.
//!
//! # Responsibilities
//! - Ensure a leading slash on caller-supplied paths
//! - Prepend the backend's `/api/v1/<service>` namespace unless already versioned
//!
//! # Design Decisions
//! - Gateway routes stay thin (`/api/v1/{service}/{*path}` captures only the tail)
//! - Already versioned paths are forwarded untouched

use crate::routing::ServiceName;

const VERSION_PREFIX: &str = "/api/v1/";

/// Compute the path sent to the backend for `path` on `service`.
pub fn upstream_path(service: ServiceName, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    if path.starts_with(VERSION_PREFIX) {
        return path;
    }

    if path == "/" {
        return service.api_prefix();
    }

    format!("{}{}", service.api_prefix(), path)
}

/// Append the inbound query string, if any.
pub fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_unversioned_paths() {
        assert_eq!(upstream_path(ServiceName::Nin, "verify"), "/api/v1/nin/verify");
        assert_eq!(upstream_path(ServiceName::Nin, "/verify"), "/api/v1/nin/verify");
        assert_eq!(upstream_path(ServiceName::Sms, "send/bulk"), "/api/v1/sms/send/bulk");
    }

    #[test]
    fn keeps_versioned_paths() {
        assert_eq!(
            upstream_path(ServiceName::Auth, "/api/v1/auth/login"),
            "/api/v1/auth/login"
        );
        assert_eq!(
            upstream_path(ServiceName::Ai, "api/v1/ai/chat"),
            "/api/v1/ai/chat"
        );
    }

    #[test]
    fn empty_tail_maps_to_service_root() {
        assert_eq!(upstream_path(ServiceName::Bvn, ""), "/api/v1/bvn");
        assert_eq!(upstream_path(ServiceName::Bvn, "/"), "/api/v1/bvn");
    }

    #[test]
    fn query_is_appended() {
        assert_eq!(with_query("/a", Some("x=1")), "/a?x=1");
        assert_eq!(with_query("/a", Some("")), "/a");
        assert_eq!(with_query("/a", None), "/a");
    }
}
