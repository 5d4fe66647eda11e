//! HTTP health probe.
//!
//! # Responsibilities
//! - Issue `GET <instance><health_path>` with a deadline
//! - Classify the outcome (only 200 is healthy)

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{self, Instant};

use crate::load_balancer::ServiceInstance;

/// Result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Healthy { elapsed: Duration },
    Unhealthy { status: Option<u16>, reason: String },
}

#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self::with_client(client, timeout)
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client<HttpConnector, Body>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn probe(&self, instance: &ServiceInstance) -> ProbeOutcome {
        let url = instance.health_url();
        let request = match Request::builder()
            .method("GET")
            .uri(&url)
            .header("user-agent", "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(url = %url, "Failed to build health check request: {}", e);
                return ProbeOutcome::Unhealthy {
                    status: None,
                    reason: e.to_string(),
                };
            }
        };

        let started = Instant::now();
        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => ProbeOutcome::Healthy {
                elapsed: started.elapsed(),
            },
            Ok(Ok(response)) => ProbeOutcome::Unhealthy {
                status: Some(response.status().as_u16()),
                reason: format!("unexpected status {}", response.status()),
            },
            Ok(Err(e)) => ProbeOutcome::Unhealthy {
                status: None,
                reason: format!("connection error: {}", e),
            },
            Err(_) => ProbeOutcome::Unhealthy {
                status: None,
                reason: "timeout".to_string(),
            },
        }
    }
}
