//! Retry logic.
//!
//! # Responsibilities
//! - Determine if request is retryable (idempotent methods only)
//! - Enforce retry budget (ratio of retries to requests)
//!
//! # Design Decisions
//! - Never retry POST/PATCH (non-idempotent)
//! - Only connection failures are retried; timeouts and backend statuses never are
//! - Retry budget prevents retry storms under load

use std::sync::atomic::{AtomicU64, Ordering};

use axum::http::Method;

use crate::config::RetryConfig;

/// Whether a request with this method may be replayed.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
    )
}

/// Process-wide cap on retries relative to first attempts.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f64,
    min_retries: u64,
    requests: AtomicU64,
    retries: AtomicU64,
}

impl RetryBudget {
    pub fn new(ratio: f32, min_retries: u64) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0) as f64,
            min_retries,
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.budget_ratio, config.min_retries)
    }

    /// Count a first attempt.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Reserve one retry if the budget allows it.
    pub fn try_acquire(&self) -> bool {
        let allowed = self.min_retries
            + (self.requests.load(Ordering::Relaxed) as f64 * self.ratio) as u64;
        self.retries
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |spent| {
                (spent < allowed).then_some(spent + 1)
            })
            .is_ok()
    }

    pub fn retries_spent(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_methods() {
        assert!(is_idempotent(&Method::GET));
        assert!(is_idempotent(&Method::DELETE));
        assert!(!is_idempotent(&Method::POST));
        assert!(!is_idempotent(&Method::PATCH));
        assert!(!is_idempotent(&Method::TRACE));
        assert!(!is_idempotent(&Method::CONNECT));
    }

    #[test]
    fn budget_grows_with_traffic() {
        let budget = RetryBudget::new(0.1, 2);
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());

        for _ in 0..20 {
            budget.record_request();
        }
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert_eq!(budget.retries_spent(), 4);
    }
}
