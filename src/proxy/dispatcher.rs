//! Request dispatcher.
//!
//! # Responsibilities
//! - Resolve the service descriptor and upstream path
//! - Pick an instance and execute the call under the service's breaker
//! - Retry idempotent requests that failed to connect
//! - Translate transport failures into gateway responses
//! - Record every call to metrics and the structured log

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request};
use axum::response::{IntoResponse, Response};
use futures_util::{future::join_all, StreamExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{self, Instant};

use crate::config::{GatewayConfig, RetryConfig, ServiceEndpointConfig, TimeoutConfig};
use crate::health::{HealthProber, HealthReport, HealthStatus, ProbeOutcome, ServiceHealth};
use crate::load_balancer::{RegistryError, RegistrySettings, ServiceRegistry};
use crate::observability::metrics;
use crate::proxy::context::ProxyRequestContext;
use crate::proxy::error::{ProxyError, UpstreamFailure};
use crate::resilience::{
    effective_timeout, is_idempotent, Backoff, BreakerSettings, CircuitBreakerError,
    CircuitBreakerManager, RetryBudget,
};
use crate::routing::{upstream_path, with_query, ServiceName};
use crate::security::headers::{prepare_upstream_headers, strip_hop_by_hop};

type HttpClient = Client<HttpConnector, Body>;

/// Reloadable knobs.
#[derive(Debug, Clone)]
struct DispatchSettings {
    timeouts: TimeoutConfig,
    retries: RetryConfig,
    max_body_size: usize,
}

impl From<&GatewayConfig> for DispatchSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            retries: config.retries.clone(),
            max_body_size: config.security.max_body_size,
        }
    }
}

/// The single choke point for backend calls.
pub struct Dispatcher {
    services: ArcSwap<BTreeMap<ServiceName, ServiceEndpointConfig>>,
    settings: ArcSwap<DispatchSettings>,
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    client: HttpClient,
    prober: HealthProber,
    retry_budget: RetryBudget,
}

impl Dispatcher {
    /// Build a dispatcher with its own registry and breaker manager.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RegistryError> {
        let registry = ServiceRegistry::from_services(
            &config.services,
            RegistrySettings::from(&config.discovery),
        )?;
        Ok(Self::new(
            config,
            Arc::new(registry),
            Arc::new(CircuitBreakerManager::new()),
        ))
    }

    pub fn new(
        config: &GatewayConfig,
        registry: Arc<ServiceRegistry>,
        breakers: Arc<CircuitBreakerManager>,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let prober = HealthProber::with_client(
            client.clone(),
            Duration::from_secs(config.discovery.probe_timeout_secs),
        );

        Self {
            services: ArcSwap::from_pointee(config.services.clone()),
            settings: ArcSwap::from_pointee(DispatchSettings::from(config)),
            registry,
            breakers,
            client,
            prober,
            retry_budget: RetryBudget::from_config(&config.retries),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn prober(&self) -> &HealthProber {
        &self.prober
    }

    pub fn service_config(&self, service: ServiceName) -> Option<ServiceEndpointConfig> {
        self.services.load().get(&service).cloned()
    }

    pub fn configured_services(&self) -> Vec<ServiceName> {
        self.services.load().keys().copied().collect()
    }

    /// Forward `request` to `service` at `path`. Never fails: errors are
    /// rendered as gateway responses.
    pub async fn proxy_request(&self, request: Request<Body>, service: &str, path: &str) -> Response {
        match self.dispatch(request, service, path).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        service_name: &str,
        path: &str,
    ) -> Result<Response, ProxyError> {
        let service: ServiceName = service_name.parse()?;
        let config = self
            .service_config(service)
            .ok_or_else(|| ProxyError::UnknownService(service_name.to_string()))?;
        let settings = self.settings.load_full();

        let (parts, body) = request.into_parts();
        let target = with_query(&upstream_path(service, path), parts.uri.query());
        let ctx = ProxyRequestContext::from_parts(&parts, service, target);
        let method = parts.method.clone();

        let body = read_body(&parts.headers, body, settings.max_body_size).await?;
        let headers = prepare_upstream_headers(&parts.headers, &ctx);

        let timeout = effective_timeout(config.timeout, &settings.timeouts);
        let max_retries = if settings.retries.enabled && is_idempotent(&method) {
            config.retries
        } else {
            0
        };
        let backoff = Backoff::from_config(&settings.retries);
        let breaker = self
            .breakers
            .get_or_create(service, BreakerSettings::from(&config));

        self.retry_budget.record_request();
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let instance = self
                .registry
                .get_instance(service)
                .ok_or(ProxyError::NoInstances(service))?;
            let url = instance.endpoint(&ctx.upstream_path);

            let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
            if let Some(h) = builder.headers_mut() {
                *h = headers.clone();
            }
            let outbound = builder
                .body(Body::from(body.clone()))
                .map_err(|e| ProxyError::BadGateway(e.to_string()))?;

            let attempt_started = Instant::now();
            let result = breaker.call(|| self.send(outbound, timeout)).await;
            let attempt_elapsed = attempt_started.elapsed();

            match result {
                Ok(response) => {
                    self.registry.record_outcome(&instance, Ok(attempt_elapsed));
                    let status = response.status().as_u16();
                    metrics::record_service_request(service, method.as_str(), status, attempt_elapsed);
                    tracing::info!(
                        request_id = %ctx.request_id,
                        service = %service,
                        method = %method,
                        upstream = %url,
                        status = status,
                        latency_ms = attempt_elapsed.as_millis() as u64,
                        attempts = attempt + 1,
                        "Service call completed"
                    );
                    return Ok(relay(response));
                }
                Err(CircuitBreakerError::Open { .. }) => {
                    let error = ProxyError::CircuitOpen(service);
                    self.log_failure(&ctx, &method, &url, &error, started.elapsed());
                    return Err(error);
                }
                Err(CircuitBreakerError::Inner(failure)) => {
                    self.registry.record_outcome(&instance, Err(()));

                    if failure.is_connect()
                        && attempt < max_retries
                        && self.retry_budget.try_acquire()
                    {
                        attempt += 1;
                        let delay = backoff.delay(attempt);
                        tracing::info!(
                            request_id = %ctx.request_id,
                            service = %service,
                            attempt = attempt,
                            delay = ?delay,
                            error = %failure,
                            "Retrying after connection failure"
                        );
                        time::sleep(delay).await;
                        continue;
                    }

                    let error = failure.into_proxy_error(service);
                    self.log_failure(&ctx, &method, &url, &error, started.elapsed());
                    return Err(error);
                }
            }
        }
    }

    async fn send(&self, request: Request<Body>, timeout: Duration) -> Result<hyper::Response<Incoming>, UpstreamFailure> {
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_connect() => Err(UpstreamFailure::Connect(e.to_string())),
            Ok(Err(e)) => Err(UpstreamFailure::Other(e.to_string())),
            Err(_) => Err(UpstreamFailure::Timeout(timeout)),
        }
    }

    fn log_failure(
        &self,
        ctx: &ProxyRequestContext,
        method: &Method,
        url: &str,
        error: &ProxyError,
        elapsed: Duration,
    ) {
        let status = error.status_code().as_u16();
        metrics::record_service_request(ctx.service, method.as_str(), status, elapsed);
        tracing::warn!(
            request_id = %ctx.request_id,
            service = %ctx.service,
            method = %method,
            upstream = %url,
            status = status,
            latency_ms = elapsed.as_millis() as u64,
            error = %error,
            "Service call failed"
        );
    }

    /// Check the first healthy instance of `service` (the first instance when
    /// none is healthy) without disturbing load balancing.
    pub async fn health_check_service(&self, service: ServiceName) -> ServiceHealth {
        if self.service_config(service).is_none() {
            return ServiceHealth::unknown(service, "Service not configured");
        }
        let Some(instance) = self.registry.health_check_target(service) else {
            return ServiceHealth::unknown(service, "No instances registered");
        };

        let url = Some(instance.url().to_string());
        match self.prober.probe(&instance).await {
            ProbeOutcome::Healthy { elapsed } => ServiceHealth {
                service,
                status: HealthStatus::Healthy,
                url,
                response_time_ms: Some(elapsed.as_secs_f64() * 1000.0),
                status_code: Some(200),
                error: None,
            },
            ProbeOutcome::Unhealthy { status, reason } => {
                tracing::debug!(service = %service, reason = %reason, "Service health check failed");
                ServiceHealth {
                    service,
                    status: HealthStatus::Unhealthy,
                    url,
                    response_time_ms: None,
                    status_code: status,
                    error: status.is_none().then(|| "Service unavailable".to_string()),
                }
            }
        }
    }

    /// Probe every configured service concurrently.
    pub async fn check_all_services(&self) -> HealthReport {
        let checks = join_all(
            self.configured_services()
                .into_iter()
                .map(|service| self.health_check_service(service)),
        )
        .await;
        HealthReport::from_checks(checks)
    }

    /// Apply a reloaded configuration.
    pub fn reload(&self, config: &GatewayConfig) -> Result<(), RegistryError> {
        self.registry
            .reload(&config.services, RegistrySettings::from(&config.discovery))?;
        self.breakers.reconfigure(&config.services);
        self.services.store(Arc::new(config.services.clone()));
        self.settings.store(Arc::new(DispatchSettings::from(config)));
        tracing::info!(services = config.services.len(), "Dispatcher reloaded");
        Ok(())
    }
}

/// Buffer the inbound body, enforcing `limit`.
async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ProxyError::PayloadTooLarge { limit });
    }

    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
        if buffer.len() + chunk.len() > limit {
            return Err(ProxyError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

/// Hand the backend response back unchanged apart from hop-by-hop headers.
fn relay(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
