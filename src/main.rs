//! # Collaborative Drawing Relay
//!
//! Runs the stroke relay: a WebSocket endpoint that buffers pen strokes per
//! frame and rebroadcasts frames on request, the eviction timer, the static
//! site and the metrics endpoint.
//!
//! ## Features
//! - Development mode (plain HTTP/WebSocket) or production mode (TLS plus
//!   HTTP to HTTPS redirect), chosen by `RELAY_DEBUG`
//! - Connection rate limiting and heartbeat
//! - Graceful shutdown handling
//! - Environment-based configuration loading
//! - Health monitoring via HTTP metrics endpoint
//!
//! ## Dependencies
//! - `tokio` for asynchronous runtime
//! - `tokio-rustls` for TLS support
//! - `dotenv` for environment configuration
//! - `tracing` for logging

use std::{net::SocketAddr, sync::Arc};
use stroke_relay::{canvas, config, server};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use stroke_relay::server::ServerState;

/// Entry point for the relay.
///
/// Initializes logging, loads configuration from the environment,
/// starts the eviction timer and the HTTP listeners, then serves WebSocket
/// clients until Ctrl+C.
///
/// # Errors
/// Returns an error if configuration validation fails or if the server fails to bind to a port.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env()?;
    config.validate()?;

    let state = Arc::new(ServerState::new(config)?);

    let eviction = canvas::spawn_eviction(
        state.canvas.clone(),
        state.config.stroke_lifetime(),
        state.metrics.clone(),
    );

    let metrics_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = server::health::serve_metrics_http(metrics_state).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    let site_config = state.config.clone();
    tokio::spawn(async move {
        if let Err(e) = server::http::serve_site(site_config).await {
            error!("Static site stopped: {}", e);
        }
    });

    let ws_addr = SocketAddr::new(state.config.host, state.config.port_ws);
    let listener = TcpListener::bind(ws_addr).await?;
    info!(
        "Relay listening on {}://{}",
        if state.config.debug { "ws" } else { "wss" },
        ws_addr
    );

    // Handle incoming connections or shutdown signals
    tokio::select! {
        _ = server::accept_connections(listener, state.clone()) => {},
        _ = shutdown_signal() => {
            info!("Shutting down gracefully");
            eviction.abort();
            state.clients.close_all();
        }
    }

    Ok(())
}

/// Waits for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
