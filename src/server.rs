//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state behind the admin API),
//! [`build_router`] and [`build_health_router`] for the Axum routers,
//! [`build_http_client`] for the pooled hyper client used by health
//! polls, and [`shutdown_signal`] / [`shutdown_requested`] for SIGTERM /
//! Ctrl+C handling.

use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware;
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::{self, ClusterApi, Credentials};
use crate::config::model::GaleraAgentTls;
use crate::config::ConfigVersion;
use crate::domain::Backend;
use crate::error::SwitchboardError;
use crate::health::health_handler;

/// Request bodies on the admin API are tiny; anything larger is a mistake.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub cluster: Arc<ClusterApi>,
    pub backends: Vec<Arc<Backend>>,
    pub credentials: Credentials,
    pub metrics: Option<PrometheusHandle>,
    pub config_source: String,
    pub config_version: ConfigVersion,
    pub start_time: Instant,
}

/// Build the client for health polls.
///
/// With agent TLS disabled this trusts the webpki roots. With it enabled
/// only the configured CA is trusted and every certificate is checked
/// against `server_name` rather than the backend host, since agents are
/// addressed by IP.
pub fn build_http_client(tls: &GaleraAgentTls) -> Result<HttpClient, SwitchboardError> {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = if tls.enabled {
        let mut roots = rustls::RootCertStore::empty();
        let mut reader = BufReader::new(tls.ca.as_bytes());
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| SwitchboardError::Tls(format!("invalid CA PEM: {e}")))?;
            roots
                .add(cert)
                .map_err(|e| SwitchboardError::Tls(format!("unusable CA certificate: {e}")))?;
        }
        if roots.is_empty() {
            return Err(SwitchboardError::Tls("CA bundle contains no certificates".into()));
        }

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        #[allow(deprecated)]
        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .with_server_name(tls.server_name.clone());
        builder.enable_http1().build()
    } else {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build()
    };

    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https))
}

/// Admin API: cluster and backend endpoints behind Basic auth, plus the
/// unauthenticated `/health` and `/metrics`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/v0/cluster",
            get(api::cluster::get_cluster_handler).patch(api::cluster::patch_cluster_handler),
        )
        .route("/v0/backends", get(api::backends::backends_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            api::basic_auth_guard,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(health_handler))
        .route("/metrics", get(api::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Liveness-only router for the dedicated health port.
pub fn build_health_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

/// Resolves once shutdown has been broadcast, or the sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
