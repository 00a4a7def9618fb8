use std::{
    fs,
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use serde::{Deserialize, Serialize};
use config::Config;
use tokio_rustls::{
    rustls::{Certificate, PrivateKey, ServerConfig as RustlsServerConfig},
    TlsAcceptor,
};
use rustls_pemfile::{certs, pkcs8_private_keys};
use crate::utils::error::RelayError;

/// Configuration settings for the relay server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Development mode: plain HTTP and WebSocket, no redirect.
    /// When false, every listener uses TLS and plain HTTP redirects to HTTPS.
    pub debug: bool,
    /// Address every listener binds to.
    pub host: IpAddr,
    /// Port for the static site in development, or the redirect in production.
    pub port_http: u16,
    /// Port for the static site in production.
    pub port_https: u16,
    /// Port for the WebSocket relay.
    pub port_ws: u16,
    /// Port for the Prometheus `/metrics` endpoint.
    pub metrics_port: u16,
    /// Directory holding the static site; `index.html` is served at `/`.
    pub static_dir: PathBuf,
    /// Path to the TLS certificate file.
    pub tls_cert_path: PathBuf,
    /// Path to the TLS private key file.
    pub tls_key_path: PathBuf,
    /// Interval between eviction passes, in milliseconds.
    pub stroke_lifetime_ms: u64,
    /// Interval between heartbeat pings, in milliseconds.
    pub ping_interval_ms: u64,
    /// Silence after which a client is dropped, in milliseconds.
    pub ping_timeout_ms: u64,
    /// Frame indices at or above this are rejected.
    pub max_frames: usize,
    /// Largest point list accepted in a single stroke.
    pub max_points_per_stroke: usize,
    /// Largest inbound text frame accepted, in bytes.
    pub max_message_bytes: usize,
    /// The maximum number of simultaneous connections allowed.
    pub max_connections: usize,
    /// Outbound messages a client may have queued before it is dropped.
    pub max_queued_messages: usize,
    /// The maximum number of connection attempts per second from one address.
    pub connection_rate_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            debug: true,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_http: 8080,
            port_https: 443,
            port_ws: 4321,
            metrics_port: 9080,
            static_dir: PathBuf::from("public"),
            tls_cert_path: PathBuf::from("certs/cert.pem"),
            tls_key_path: PathBuf::from("certs/key.pem"),
            stroke_lifetime_ms: 10_000,
            ping_interval_ms: 5_000,
            ping_timeout_ms: 10_000,
            max_frames: crate::canvas::DEFAULT_MAX_FRAMES,
            max_points_per_stroke: 10_000,
            max_message_bytes: 1024 * 1024,
            max_connections: 1_000,
            max_queued_messages: 1_024,
            connection_rate_limit: 100,
        }
    }
}

impl ServerConfig {
    /// Loads the server configuration from environment variables layered
    /// over the defaults.
    ///
    /// Environment variables should be prefixed with `RELAY_`, e.g.
    /// `RELAY_PORT_WS=4321` or `RELAY_DEBUG=false`.
    ///
    /// # Errors
    /// Returns a `RelayError::ConfigurationError` if the configuration cannot be loaded.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_source(config::Environment::with_prefix("RELAY").try_parsing(true))
    }

    /// Loads the configuration from an arbitrary source layered over the defaults.
    ///
    /// # Errors
    /// Returns a `RelayError::ConfigurationError` if the configuration cannot be loaded.
    pub fn from_source<S>(source: S) -> Result<Self, RelayError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| RelayError::ConfigurationError(e.to_string()))?;

        Config::builder()
            .add_source(defaults)
            .add_source(source)
            .build()
            .map_err(|e| RelayError::ConfigurationError(e.to_string()))?
            .try_deserialize()
            .map_err(|e| RelayError::ConfigurationError(e.to_string()))
    }

    /// Validates the configuration settings.
    ///
    /// Ensures that the TLS files exist in production mode and that every
    /// limit and interval is usable.
    ///
    /// # Errors
    /// Returns a `RelayError::ConfigurationError` if validation fails.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !self.debug {
            if !self.tls_cert_path.exists() {
                return Err(RelayError::ConfigurationError(format!(
                    "Certificate file not found: {:?}",
                    self.tls_cert_path
                )));
            }

            if !self.tls_key_path.exists() {
                return Err(RelayError::ConfigurationError(format!(
                    "Key file not found: {:?}",
                    self.tls_key_path
                )));
            }
        }

        if self.max_connections == 0 {
            return Err(RelayError::ConfigurationError(
                "max_connections must be greater than 0".into()
            ));
        }

        if self.max_queued_messages == 0 {
            return Err(RelayError::ConfigurationError(
                "max_queued_messages must be greater than 0".into()
            ));
        }

        if self.connection_rate_limit == 0 {
            return Err(RelayError::ConfigurationError(
                "connection_rate_limit must be greater than 0".into()
            ));
        }

        if self.max_frames == 0 {
            return Err(RelayError::ConfigurationError(
                "max_frames must be greater than 0".into()
            ));
        }

        if self.stroke_lifetime_ms == 0 || self.ping_interval_ms == 0 {
            return Err(RelayError::ConfigurationError(
                "stroke_lifetime_ms and ping_interval_ms must be greater than 0".into()
            ));
        }

        if self.ping_timeout_ms < self.ping_interval_ms {
            return Err(RelayError::ConfigurationError(
                "ping_timeout_ms cannot be shorter than ping_interval_ms".into()
            ));
        }

        Ok(())
    }

    pub fn stroke_lifetime(&self) -> Duration {
        Duration::from_millis(self.stroke_lifetime_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Creates a TLS acceptor for secure WebSocket connections.
    ///
    /// In development mode, returns `None`. Otherwise, loads the TLS certificate and private key,
    /// and initializes a Rustls TLS acceptor.
    ///
    /// # Errors
    /// Returns a `RelayError::ConfigurationError` if any part of the TLS setup fails.
    pub fn create_tls_acceptor(&self) -> Result<Option<Arc<TlsAcceptor>>, RelayError> {
        if self.debug {
            return Ok(None);
        }

        // Load certificate chain
        let cert_chain = fs::read(&self.tls_cert_path)
            .map_err(|e| RelayError::ConfigurationError(format!(
                "Certificate error: {} (path: {:?})",
                e, self.tls_cert_path
            )))?;

        // Load private key
        let key_der = fs::read(&self.tls_key_path)
            .map_err(|e| RelayError::ConfigurationError(format!(
                "Key error: {} (path: {:?})",
                e, self.tls_key_path
            )))?;

        let certs = certs(&mut cert_chain.as_slice())
            .map_err(|e| RelayError::ConfigurationError(format!(
                "Cert parse error: {}", e
            )))?;

        let key = pkcs8_private_keys(&mut key_der.as_slice())
            .map_err(|e| RelayError::ConfigurationError(format!(
                "Key parse error: {}", e
            )))?
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::ConfigurationError(format!(
                "No PKCS#8 private key in {:?}", self.tls_key_path
            )))?;

        let config = RustlsServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(
                certs.into_iter().map(Certificate).collect(),
                PrivateKey(key),
            )
            .map_err(|e| RelayError::ConfigurationError(format!(
                "TLS config error: {}", e
            )))?;

        Ok(Some(Arc::new(TlsAcceptor::from(Arc::new(config)))))
    }
}
