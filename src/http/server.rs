//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Construct the dispatcher, authenticator and rate limiter from config
//! - Create the Axum router with all handlers and the middleware stack
//! - Run background tasks (health monitor, limiter purge, config reload)
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::health::{HealthMonitor, HealthReport, HealthReporter};
use crate::http::handlers;
use crate::http::middleware::{access_log_middleware, auth_middleware};
use crate::http::request_id_middleware;
use crate::lifecycle::Shutdown;
use crate::load_balancer::RegistryError;
use crate::proxy::Dispatcher;
use crate::resilience::effective_timeout;
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{Authenticator, RateLimiter};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid service registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid authentication settings: {0}")]
    Auth(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub authenticator: Arc<ArcSwap<Authenticator>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub health_reporter: Arc<HealthReporter>,
    pub started_at: Instant,
    pub metrics_enabled: bool,
    pub access_log_enabled: bool,
}

impl AppState {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServerError> {
        Ok(Self {
            dispatcher: Arc::new(Dispatcher::from_config(config)?),
            authenticator: Arc::new(ArcSwap::from_pointee(Authenticator::new(&config.auth)?)),
            rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            health_reporter: Arc::new(HealthReporter::new(Duration::from_secs(
                config.discovery.report_cache_secs,
            ))),
            started_at: Instant::now(),
            metrics_enabled: config.observability.metrics_enabled,
            access_log_enabled: config.observability.access_log_enabled,
        })
    }

    /// Aggregated service health, served from cache while fresh.
    pub async fn services_report(&self) -> HealthReport {
        let dispatcher = self.dispatcher.clone();
        self.health_reporter
            .get_or_refresh(|| async move { dispatcher.check_all_services().await })
            .await
    }

    /// Swap in a reloaded configuration. On error the running config is kept.
    ///
    /// Listener address, rate limits and observability toggles are fixed at
    /// startup.
    pub async fn apply_config(&self, config: &GatewayConfig) {
        let authenticator = match Authenticator::new(&config.auth) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(error = %e, "Rejected config reload: invalid auth settings");
                return;
            }
        };
        if let Err(e) = self.dispatcher.reload(config) {
            tracing::error!(error = %e, "Rejected config reload: invalid services");
            return;
        }
        self.authenticator.store(Arc::new(authenticator));
        self.health_reporter.invalidate().await;
        tracing::info!("Configuration reloaded");
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let state = AppState::new(&config)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: trace, request id, access log, auth, rate limit.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/api/v1/{service}", any(handlers::proxy))
            .route("/api/v1/{service}/{*path}", any(handlers::proxy))
            .route("/health", get(handlers::gateway_health))
            .route("/metrics", get(handlers::metrics_endpoint))
            .route("/services/health", get(handlers::services_health))
            .route("/services/status", get(handlers::services_status))
            .route("/services/{name}/health", get(handlers::service_health))
            .route("/services/{name}/metrics", get(handlers::service_metrics))
            .with_state(state.clone());

        if config.rate_limit.enabled {
            router = router.layer(from_fn_with_state(
                state.rate_limiter.clone(),
                rate_limit_middleware,
            ));
        }

        router
            .layer(from_fn_with_state(state.clone(), auth_middleware))
            .layer(from_fn_with_state(state, access_log_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                request_deadline(config),
            ))
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = self.config.services.len(),
            "HTTP server starting"
        );

        if self.config.discovery.enabled {
            let monitor = HealthMonitor::new(
                self.state.dispatcher.registry().clone(),
                self.state.dispatcher.prober().clone(),
                Duration::from_secs(self.config.discovery.sweep_interval_secs),
            );
            tokio::spawn(monitor.run(shutdown.subscribe()));
        }

        if self.config.rate_limit.enabled {
            let limiter = self.state.rate_limiter.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(limiter.window());
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let purged = limiter.purge_expired();
                            if purged > 0 {
                                tracing::debug!(purged = purged, "Purged idle rate limit windows");
                            }
                        }
                        _ = stop.recv() => break,
                    }
                }
            });
        }

        let state = self.state.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => state.apply_config(&config).await,
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Backstop for a whole request: the slowest service's attempts plus the
/// longest backoff between them, with one connect timeout of slack. Inner
/// deadlines always fire first, so the breaker still sees the failure.
fn request_deadline(config: &GatewayConfig) -> Duration {
    let max_retries = if config.retries.enabled {
        config.services.values().map(|s| s.retries).max().unwrap_or(0)
    } else {
        0
    };
    let slowest = config
        .services
        .values()
        .map(|s| effective_timeout(s.timeout, &config.timeouts))
        .max()
        .unwrap_or_else(|| Duration::from_secs(config.timeouts.max_secs));
    // Jitter adds up to 10% on top of each capped delay.
    let backoff = Duration::from_millis(config.retries.max_delay_ms + config.retries.max_delay_ms / 10);

    slowest * (max_retries + 1) + backoff * max_retries + Duration::from_secs(config.timeouts.connect_secs)
}
