//! In-memory model of the cluster as seen by the proxy.
//!
//! - [`Backend`]: one Galera node, its health flag and its open bridges.
//! - [`Bridge`]: a single client/backend byte pipe.
//! - [`Bridges`]: the per-backend registry of live bridges.
//! - [`Dialer`]: how a backend opens its data connection.
//!
//! Collaborators (`Dialer`, `BridgeFactory`) are passed in at construction
//! so tests can substitute them without any global state.

pub mod backend;
pub mod bridge;
pub mod bridges;
pub mod dialer;

use tokio::io::{AsyncRead, AsyncWrite};

pub use backend::{new_backends, Backend, BackendJson};
pub use bridge::{Bridge, BridgeFactory, BridgeId, CopyBridge, CopyBridgeFactory};
pub use bridges::Bridges;
pub use dialer::{Dialer, TcpDialer};

/// A bidirectional byte stream: a TCP socket in production, an in-memory
/// duplex in tests.
pub trait Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Conn for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxConn = Box<dyn Conn>;
