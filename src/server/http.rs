//! Static site and HTTPS redirect.
//!
//! In development mode the site is served over plain HTTP on `port_http`.
//! In production mode it is served over HTTPS on `port_https`, and
//! `port_http` answers every request with a permanent redirect to the same
//! host and path over `https://`.

use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::{config::ServerConfig, utils::RelayError};

/// Serves `index.html` at `/` and everything else from `static_dir`.
pub fn site_router(static_dir: &Path) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .fallback_service(ServeDir::new(static_dir))
}

/// Redirects every request to its `https://` equivalent.
pub fn redirect_router() -> Router {
    Router::new().fallback(redirect_to_https)
}

/// Builds the redirect target for a request received on `host`.
pub fn https_location(host: &str, uri: &Uri) -> String {
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("https://{}{}", host, path)
}

async fn redirect_to_https(headers: HeaderMap, uri: Uri) -> Response {
    match headers.get(header::HOST).and_then(|host| host.to_str().ok()) {
        Some(host) => (
            StatusCode::MOVED_PERMANENTLY,
            [(header::LOCATION, https_location(host, &uri))],
        )
            .into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Runs the static site listeners for the configured mode until one fails.
///
/// # Errors
/// Returns `RelayError::Io` if a port cannot be bound, the TLS material
/// cannot be loaded, or a server stops with an error.
pub async fn serve_site(config: Arc<ServerConfig>) -> Result<(), RelayError> {
    let site = site_router(&config.static_dir);
    let http_addr = SocketAddr::new(config.host, config.port_http);

    if config.debug {
        let listener = TcpListener::bind(http_addr).await?;
        info!("Listening on http port {}", config.port_http);
        axum::serve(listener, site).await?;
        return Ok(());
    }

    let tls = RustlsConfig::from_pem_file(&config.tls_cert_path, &config.tls_key_path).await?;
    let https_addr = SocketAddr::new(config.host, config.port_https);
    let redirect_listener = TcpListener::bind(http_addr).await?;

    info!("Redirecting http port {} to https", config.port_http);
    info!("Listening on https port {}", config.port_https);

    tokio::try_join!(
        async {
            axum::serve(redirect_listener, redirect_router())
                .await
                .map_err(RelayError::from)
        },
        async {
            axum_server::bind_rustls(https_addr, tls)
                .serve(site.into_make_service())
                .await
                .map_err(RelayError::from)
        },
    )?;

    Ok(())
}
