//! A single full-duplex byte pipe between a client and a backend.
//!
//! [`CopyBridge::connect`] runs both copy directions concurrently. The
//! first direction to finish (EOF, error, or an external [`Bridge::close`])
//! tears down both streams, so the opposite direction can never be left
//! blocked on a read.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use uuid::Uuid;

use super::BoxConn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeId(Uuid);

impl BridgeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait Bridge: Send + Sync {
    fn id(&self) -> BridgeId;

    /// Pump bytes in both directions until either side finishes or the
    /// bridge is closed.
    async fn connect(&self);

    /// Close both streams. Safe to call more than once, and before or
    /// during [`connect`](Bridge::connect).
    fn close(&self);
}

/// Builds bridges for a [`Bridges`](super::Bridges) registry.
pub trait BridgeFactory: Send + Sync {
    fn create(&self, client: BoxConn, backend: BoxConn) -> Arc<dyn Bridge>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CopyBridgeFactory;

impl BridgeFactory for CopyBridgeFactory {
    fn create(&self, client: BoxConn, backend: BoxConn) -> Arc<dyn Bridge> {
        Arc::new(CopyBridge::new(client, backend))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    ClientFinished,
    BackendFinished,
    Closed,
}

pub struct CopyBridge {
    id: BridgeId,
    streams: Mutex<Option<(BoxConn, BoxConn)>>,
    closed: watch::Sender<bool>,
}

impl CopyBridge {
    #[must_use]
    pub fn new(client: BoxConn, backend: BoxConn) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: BridgeId::new(),
            streams: Mutex::new(Some((client, backend))),
            closed,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn take_streams(&self) -> Option<(BoxConn, BoxConn)> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|c| *c).await;
}

#[async_trait]
impl Bridge for CopyBridge {
    fn id(&self) -> BridgeId {
        self.id
    }

    async fn connect(&self) {
        let closed = self.closed.subscribe();
        let Some((client, backend)) = self.take_streams() else {
            // closed before it was ever started
            return;
        };

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut backend_read, mut backend_write) = tokio::io::split(backend);

        let ending = tokio::select! {
            result = tokio::io::copy(&mut client_read, &mut backend_write) => {
                if let Err(e) = result {
                    tracing::debug!(bridge = %self.id, error = %e, "client to backend copy failed");
                }
                Ending::ClientFinished
            }
            result = tokio::io::copy(&mut backend_read, &mut client_write) => {
                if let Err(e) = result {
                    tracing::debug!(bridge = %self.id, error = %e, "backend to client copy failed");
                }
                Ending::BackendFinished
            }
            () = wait_closed(closed) => Ending::Closed,
        };

        self.closed.send_replace(true);

        // Half-close both write sides so each peer sees EOF even if the
        // read halves outlive this frame briefly. Dropping the halves
        // below releases the sockets.
        let _ = client_write.shutdown().await;
        let _ = backend_write.shutdown().await;

        tracing::debug!(bridge = %self.id, ending = ?ending, "bridge closed");
    }

    fn close(&self) {
        self.closed.send_replace(true);
        drop(self.take_streams());
    }
}
