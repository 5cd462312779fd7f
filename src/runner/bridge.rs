//! The proxy listener.
//!
//! A [`BridgeRunner`] owns one TCP listener and its own copy of the active
//! backend. Everything that changes that copy (elections, traffic toggles,
//! shutdown) arrives on channels and is handled in the same select loop as
//! `accept`, so no lock is needed to route a connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::Instrument;

use crate::domain::backend::same_backend;
use crate::monitor::ActiveBackend;
use crate::server::shutdown_requested;

/// Pause after a failed `accept` so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct BridgeRunner {
    active_backends: mpsc::Receiver<ActiveBackend>,
    traffic_enabled: mpsc::Receiver<bool>,
    shutdown_delay: Duration,
}

impl BridgeRunner {
    #[must_use]
    pub fn new(
        active_backends: mpsc::Receiver<ActiveBackend>,
        traffic_enabled: mpsc::Receiver<bool>,
        shutdown_delay: Duration,
    ) -> Self {
        Self {
            active_backends,
            traffic_enabled,
            shutdown_delay,
        }
    }

    /// Serve `listener` until shutdown, then keep accepting for the
    /// configured delay so clients can drain off a terminating instance.
    pub async fn run(mut self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let mut active: ActiveBackend = None;
        let mut traffic_enabled = true;
        let mut drain_deadline: Option<Instant> = None;

        match listener.local_addr() {
            Ok(addr) => tracing::info!(%addr, "proxy listening"),
            Err(e) => tracing::warn!(error = %e, "proxy listening on unknown address"),
        }

        loop {
            let deadline = drain_deadline;
            let draining = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = shutdown_requested(&mut shutdown), if drain_deadline.is_none() => {
                    tracing::info!(
                        delay_secs = self.shutdown_delay.as_secs(),
                        "shutdown requested, proxy keeps accepting until the delay expires"
                    );
                    drain_deadline = Some(Instant::now() + self.shutdown_delay);
                }
                () = draining => break,
                Some(next) = self.active_backends.recv() => {
                    if let Some(previous) = active.as_ref() {
                        if !same_backend(Some(previous), next.as_ref()) {
                            previous.sever_connections();
                        }
                    }
                    tracing::info!(
                        backend = next.as_ref().map_or("none", |b| b.name()),
                        "proxy routing to new active backend"
                    );
                    active = next;
                }
                Some(enabled) = self.traffic_enabled.recv() => {
                    if traffic_enabled && !enabled {
                        if let Some(backend) = active.as_ref() {
                            backend.sever_connections();
                        }
                    }
                    if traffic_enabled != enabled {
                        tracing::info!(traffic_enabled = enabled, "proxy traffic toggled");
                    }
                    traffic_enabled = enabled;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => handle_connection(stream, peer, active.clone(), traffic_enabled),
                    Err(e) => {
                        tracing::error!(error = %e, "error accepting client connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        tracing::info!("proxy stopped");
    }
}

impl std::fmt::Debug for BridgeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRunner")
            .field("shutdown_delay", &self.shutdown_delay)
            .finish_non_exhaustive()
    }
}

fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    active: ActiveBackend,
    traffic_enabled: bool,
) {
    if !traffic_enabled {
        tracing::debug!(%peer, "traffic disabled, closing client connection");
        return;
    }
    let Some(backend) = active else {
        tracing::debug!(%peer, "no active backend, closing client connection");
        return;
    };
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY on client connection");
    }
    // Read in the select loop, before any later election can sever.
    let generation = backend.sever_generation();

    tokio::spawn(
        async move {
            if let Err(e) = backend.bridge(Box::new(stream), generation).await {
                tracing::error!(%peer, error = %e, "failed to bridge client connection");
            }
        }
        .in_current_span(),
    );
}
