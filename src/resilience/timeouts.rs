//! Timeout enforcement.
//!
//! # Responsibilities
//! - Resolve the deadline for a backend call from service and global settings
//! - Clamp per-service values to the platform maximum
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities at the call site
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::time::Duration;

use crate::config::TimeoutConfig;

/// Absolute ceiling regardless of configuration.
pub const PLATFORM_MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Request deadline for a service whose configured timeout is `service_secs`.
///
/// Zero falls back to the global default; the result never exceeds
/// `timeouts.max_secs` nor the platform maximum.
pub fn effective_timeout(service_secs: u64, timeouts: &TimeoutConfig) -> Duration {
    let secs = if service_secs == 0 {
        timeouts.default_secs
    } else {
        service_secs
    };
    Duration::from_secs(secs.min(timeouts.max_secs)).min(PLATFORM_MAX_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_uses_default() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(effective_timeout(0, &timeouts), Duration::from_secs(30));
        assert_eq!(effective_timeout(5, &timeouts), Duration::from_secs(5));
    }

    #[test]
    fn clamps_to_configured_and_platform_max() {
        let mut timeouts = TimeoutConfig::default();
        assert_eq!(effective_timeout(900, &timeouts), Duration::from_secs(300));

        timeouts.max_secs = 60;
        assert_eq!(effective_timeout(120, &timeouts), Duration::from_secs(60));

        timeouts.max_secs = 1000;
        assert_eq!(effective_timeout(900, &timeouts), PLATFORM_MAX_TIMEOUT);
    }
}
