//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_gateway::config::{GatewayConfig, ServiceEndpointConfig};
use api_gateway::lifecycle::Shutdown;
use api_gateway::routing::ServiceName;
use api_gateway::HttpServer;
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const TEST_SECRET: &str = "integration-test-secret";

/// What the mock backend answers for one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Requests received so far, health probes excluded.
    pub fn requests(&self) -> Vec<Captured> {
        self.captured
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path_and_query != "/health")
            .cloned()
            .collect()
    }

    pub fn last_request(&self) -> Captured {
        self.requests().pop().expect("backend received no request")
    }
}

type ReplyFuture = Pin<Box<dyn Future<Output = Reply> + Send>>;
type Responder = Arc<dyn Fn(u32) -> ReplyFuture + Send + Sync>;

#[derive(Clone)]
struct MockState {
    hits: Arc<AtomicU32>,
    captured: Arc<Mutex<Vec<Captured>>>,
    responder: Responder,
}

async fn mock_handler(State(state): State<MockState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|p| p.to_string())
        .unwrap_or_default();

    if path_and_query != "/health" {
        state.captured.lock().unwrap().push(Captured {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
        });
    }
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);

    let reply = (state.responder)(hit).await;
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
    (status, [(header::CONTENT_TYPE, "application/json")], reply.body).into_response()
}

/// Start a programmable backend on an ephemeral port. `f` receives the
/// zero-based hit number.
pub async fn start_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let captured = Arc::new(Mutex::new(Vec::new()));
    let responder: Responder = Arc::new(move |hit| -> ReplyFuture { Box::pin(f(hit)) });

    let app = Router::new().fallback(mock_handler).with_state(MockState {
        hits: hits.clone(),
        captured: captured.clone(),
        responder,
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend {
        addr,
        hits,
        captured,
    }
}

/// A backend that always answers `200 {"ok":true}`.
pub async fn start_ok_backend() -> MockBackend {
    start_backend(|_| async { Reply::json(200, r#"{"ok":true}"#) }).await
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gateway configuration with only `services`, background tasks off and
/// short retry delays.
pub fn gateway_config(services: &[(ServiceName, String)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services.clear();
    for (service, url) in services {
        config
            .services
            .insert(*service, ServiceEndpointConfig::new(*service, url.clone()));
    }
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.discovery.enabled = false;
    config.rate_limit.enabled = false;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.observability.metrics_enabled = false;
    config
}

/// Serve a gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_tx, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

/// HS256 token for `sub`, signed with the test secret.
pub fn token(sub: &str) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({ "sub": sub }),
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
