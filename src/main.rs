//! API Gateway
//!
//! Authenticated request routing in front of the auth, config and
//! verification services, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────────┐
//!                      │                       API GATEWAY                          │
//!                      │                                                            │
//!   Client Request     │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────┐  │
//!   ───────────────────┼─▶│request id│──▶│   auth   │──▶│rate limit│──▶│handlers│  │
//!                      │  │access log│   │          │   │          │   │        │  │
//!                      │  └──────────┘   └──────────┘   └──────────┘   └───┬────┘  │
//!                      │                                                    │       │
//!                      │                                                    ▼       │
//!                      │  ┌──────────────┐   ┌────────────────┐   ┌────────────┐  │
//!   Client Response    │  │   registry   │◀──│circuit breaker │◀──│ dispatcher │  │
//!   ◀──────────────────┼──│ + balancer   │   │  (per service) │   │            │  │
//!                      │  └──────┬───────┘   └────────────────┘   └────────────┘  │
//!                      │         │                                                 │
//!                      │         ▼                                                 │
//!                      │   backend instance ◀── health monitor (periodic probes)  │
//!                      └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_gateway::config::{self, watcher::ConfigWatcher};
use api_gateway::lifecycle::{shutdown_signal, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "API gateway for the verification platform", long_about = None)]
struct Args {
    /// TOML configuration file. Environment variables and defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path),
        None => config::load_default(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("api-gateway: {}", e);
            std::process::exit(1);
        }
    };

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");

    if config.observability.metrics_enabled {
        metrics::init_metrics();
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        strategy = ?config.discovery.strategy,
        rate_limit = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
