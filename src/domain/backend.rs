//! One Galera node as seen by the proxy.
//!
//! A [`Backend`] owns its health flag and its [`Bridges`] registry, each
//! behind its own lock. Nothing here locks across backends, so a slow or
//! failing node never contends with the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::bridge::BridgeFactory;
use super::bridges::Bridges;
use super::dialer::Dialer;
use super::BoxConn;
use crate::config::model::BackendConfig;
use crate::error::SwitchboardError;
use crate::metrics;

/// Plain-HTTP port the Galera agent always listens on, used as the second
/// step of the TLS health check waterfall.
pub const AGENT_FALLBACK_PORT: u16 = 9200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendJson {
    pub host: String,
    pub port: u16,
    pub status_port: u16,
    pub healthy: bool,
    pub name: String,
    #[serde(rename = "currentSessionCount")]
    pub current_session_count: usize,
}

pub struct Backend {
    name: String,
    host: String,
    port: u16,
    status_port: u16,
    status_endpoint: String,
    healthy: Mutex<bool>,
    bridges: Bridges,
    /// Bumped by every [`Backend::sever_connections`].
    sever_generation: AtomicU64,
    dialer: Arc<dyn Dialer>,
}

impl Backend {
    #[must_use]
    pub fn new(
        config: &BackendConfig,
        dialer: Arc<dyn Dialer>,
        bridge_factory: Arc<dyn BridgeFactory>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            status_port: config.status_port,
            status_endpoint: config.status_endpoint.trim_start_matches('/').to_string(),
            healthy: Mutex::new(false),
            bridges: Bridges::new(bridge_factory),
            sever_generation: AtomicU64::new(0),
            dialer,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Health URLs to try in order. With TLS the plain agent port is a
    /// fallback for when the TLS endpoint cannot be reached at all.
    #[must_use]
    pub fn healthcheck_urls(&self, use_tls: bool) -> Vec<String> {
        if use_tls {
            vec![
                format!(
                    "https://{}:{}/{}",
                    self.host, self.status_port, self.status_endpoint
                ),
                format!(
                    "http://{}:{}/{}",
                    self.host, AGENT_FALLBACK_PORT, self.status_endpoint
                ),
            ]
        } else {
            vec![format!(
                "http://{}:{}/{}",
                self.host, self.status_port, self.status_endpoint
            )]
        }
    }

    /// Current sever generation. Read it when routing a client and hand it
    /// to [`Backend::bridge`] so a sever that lands while the dial is in
    /// flight still reaches that client.
    #[must_use]
    pub fn sever_generation(&self) -> u64 {
        self.sever_generation.load(Ordering::SeqCst)
    }

    /// Dial the data port and pipe `client` through until either side hangs
    /// up or the bridge is severed. Only a failed dial is reported.
    ///
    /// `generation` is the [`sever_generation`](Backend::sever_generation)
    /// seen when the client was routed here. If the backend was severed
    /// since, the new bridge is closed instead of connected.
    pub async fn bridge(&self, client: BoxConn, generation: u64) -> Result<(), SwitchboardError> {
        let addr = self.address();
        let backend_conn =
            self.dialer
                .dial(&addr)
                .await
                .map_err(|source| SwitchboardError::BackendDial {
                    backend: self.name.clone(),
                    addr: addr.clone(),
                    source,
                })?;

        let bridge = self.bridges.create(client, backend_conn);

        // The registry lock orders this load after any sever that already
        // swapped the set out, so a bridge is either swept or caught here.
        if self.sever_generation() != generation {
            tracing::debug!(backend = %self.name, "backend severed while dialing, closing client");
            if let Err(e) = self.bridges.remove(&bridge) {
                tracing::debug!(backend = %self.name, error = %e, "bridge already deregistered");
            }
            bridge.close();
            self.record_sessions();
            return Ok(());
        }
        self.record_sessions();

        bridge.connect().await;

        // A severed bridge has already been dropped from the registry.
        if let Err(e) = self.bridges.remove(&bridge) {
            tracing::debug!(backend = %self.name, error = %e, "bridge already deregistered");
        }
        self.record_sessions();
        Ok(())
    }

    pub fn sever_connections(&self) {
        tracing::info!(
            backend = %self.name,
            sessions = self.bridges.size(),
            "severing all connections to backend"
        );
        self.sever_generation.fetch_add(1, Ordering::SeqCst);
        self.bridges.remove_and_close_all();
        self.record_sessions();
    }

    pub fn set_healthy(&self) {
        self.transition(true);
    }

    pub fn set_unhealthy(&self) {
        self.transition(false);
    }

    fn transition(&self, healthy: bool) {
        let previous = {
            let mut flag = self.healthy.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *flag, healthy)
        };
        if previous != healthy {
            if healthy {
                tracing::info!(backend = %self.name, host = %self.host, "previously unhealthy backend became healthy");
            } else {
                tracing::info!(backend = %self.name, host = %self.host, "previously healthy backend became unhealthy");
            }
        }
    }

    #[must_use]
    pub fn healthy(&self) -> bool {
        *self.healthy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.bridges.size()
    }

    #[must_use]
    pub fn as_json(&self) -> BackendJson {
        BackendJson {
            host: self.host.clone(),
            port: self.port,
            status_port: self.status_port,
            healthy: self.healthy(),
            name: self.name.clone(),
            current_session_count: self.bridges.size(),
        }
    }

    fn record_sessions(&self) {
        metrics::record_backend_sessions(&self.name, self.bridges.size());
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("status_port", &self.status_port)
            .field("healthy", &self.healthy())
            .field("sessions", &self.bridges.size())
            .finish()
    }
}

/// Build one backend per config entry, all sharing the same collaborators.
#[must_use]
pub fn new_backends(
    configs: &[BackendConfig],
    dialer: &Arc<dyn Dialer>,
    bridge_factory: &Arc<dyn BridgeFactory>,
) -> Vec<Arc<Backend>> {
    configs
        .iter()
        .map(|config| {
            Arc::new(Backend::new(
                config,
                Arc::clone(dialer),
                Arc::clone(bridge_factory),
            ))
        })
        .collect()
}

/// Identity comparison for elected backends.
#[must_use]
pub fn same_backend(a: Option<&Arc<Backend>>, b: Option<&Arc<Backend>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
