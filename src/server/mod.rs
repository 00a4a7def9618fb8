// src/server/mod.rs
pub mod client;
pub mod dispatch;
pub mod handler;
pub mod health;
pub mod http;
pub mod message;
pub mod middleware;

// Re-export public components
pub use client::{Client, ClientManager};
pub use dispatch::{dispatch, dispatch_message, Dispatched};
pub use handler::handle_connection;
pub use message::{ClientEvent, ServerEvent};
pub use health::HealthMetrics;
pub use middleware::rate_limit::ConnectionRateLimiter;

// Import internal dependencies
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::Semaphore, time};
use tokio_rustls::TlsAcceptor;
use tracing::{error, warn};
use crate::{canvas::Canvas, config::ServerConfig, utils::RelayError};

/// How often the rate limiter forgets idle addresses and the registry drops
/// clients whose writer has stopped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Everything the connection handlers, the dispatcher and the eviction
/// scheduler share. Built once at startup and passed around explicitly.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub canvas: Arc<Canvas>,
    pub clients: ClientManager,
    pub tls_acceptor: Option<Arc<TlsAcceptor>>,
    pub metrics: HealthMetrics,
    pub rate_limiter: ConnectionRateLimiter,
    /// One permit per allowed connection, held for the session's lifetime.
    pub connection_slots: Arc<Semaphore>,
}

impl ServerState {
    /// Builds the shared state for `config`, loading TLS material in
    /// production mode.
    ///
    /// # Errors
    /// Returns an error if the TLS acceptor or the metrics registry cannot be
    /// created.
    pub fn new(config: ServerConfig) -> Result<Self, RelayError> {
        Ok(Self {
            canvas: Arc::new(Canvas::new(config.max_frames)),
            clients: ClientManager::new(),
            tls_acceptor: config.create_tls_acceptor()?,
            metrics: HealthMetrics::new()?,
            rate_limiter: ConnectionRateLimiter::new(config.connection_rate_limit),
            connection_slots: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config),
        })
    }
}

/// Accepts TCP connections forever, spawning a task per connection.
///
/// Addresses over their connection rate are dropped before the TLS or
/// WebSocket handshake.
pub async fn accept_connections(listener: TcpListener, state: Arc<ServerState>) {
    let mut prune = time::interval(PRUNE_INTERVAL);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if !state.rate_limiter.check(addr.ip()) {
                        warn!("Rate limit exceeded for {}", addr);
                        continue;
                    }
                    tokio::spawn(handler::handle_tcp(stream, addr, state.clone()));
                }
                Err(e) => error!("Accept error: {}", e),
            },
            _ = prune.tick() => {
                state.rate_limiter.prune();
                state.clients.cleanup();
            }
        }
    }
}
