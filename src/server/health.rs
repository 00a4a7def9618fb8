use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use axum::{Router, routing::get, extract::State, http::StatusCode, response::IntoResponse};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{server::ServerState, utils::RelayError};

/// Struct for managing relay health metrics: connections, inbound events,
/// buffered strokes and broadcasts.
#[derive(Clone)]
pub struct HealthMetrics {
    /// Tracks the number of active WebSocket connections.
    pub connections: IntGauge,
    /// Counts every inbound event envelope, valid or not.
    pub events_received: IntCounter,
    /// Counts strokes accepted into a frame buffer.
    pub strokes_added: IntCounter,
    /// Counts events dropped as malformed or carrying an invalid index.
    pub events_discarded: IntCounter,
    /// Counts `newFrameFromServer` broadcasts.
    pub frames_broadcast: IntCounter,
    /// Counts strokes removed by the eviction scheduler.
    pub strokes_evicted: IntCounter,
    /// Number of materialized frame buffers.
    pub frames: IntGauge,
    /// Prometheus registry used to store and manage the metrics.
    registry: Registry,
}

impl HealthMetrics {
    /// Creates a new instance of `HealthMetrics` and registers the metrics with Prometheus.
    ///
    /// # Errors
    /// Returns a `prometheus::Error` if a metric cannot be created or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let connections = IntGauge::new("connections", "Active connections")?;
        let events_received = IntCounter::new("events_received", "Total events received")?;
        let strokes_added = IntCounter::new("strokes_added", "Total strokes buffered")?;
        let events_discarded = IntCounter::new("events_discarded", "Total events discarded")?;
        let frames_broadcast = IntCounter::new("frames_broadcast", "Total frames broadcast")?;
        let strokes_evicted = IntCounter::new("strokes_evicted", "Total strokes evicted")?;
        let frames = IntGauge::new("frames", "Materialized frame buffers")?;

        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(strokes_added.clone()))?;
        registry.register(Box::new(events_discarded.clone()))?;
        registry.register(Box::new(frames_broadcast.clone()))?;
        registry.register(Box::new(strokes_evicted.clone()))?;
        registry.register(Box::new(frames.clone()))?;

        Ok(Self {
            connections,
            events_received,
            strokes_added,
            events_discarded,
            frames_broadcast,
            strokes_evicted,
            frames,
            registry,
        })
    }

    /// Exposes the current state of all registered metrics in Prometheus-compatible format.
    ///
    /// # Errors
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn expose_metrics(&self) -> Result<String, RelayError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RelayError::SerializationError(e.to_string()))
    }
}

/// Router serving the `/metrics` endpoint.
pub fn metrics_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Starts an HTTP server exposing the metrics on the configured metrics port.
///
/// # Errors
/// Returns `RelayError::Io` if the port cannot be bound or the server fails.
pub async fn serve_metrics_http(state: Arc<ServerState>) -> Result<(), RelayError> {
    let addr = SocketAddr::new(state.config.host, state.config.metrics_port);
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics available on http://{}/metrics", addr);

    axum::serve(listener, metrics_router(state)).await?;
    Ok(())
}

/// Handles the `/metrics` HTTP request and returns the current metrics data.
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.metrics.expose_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
