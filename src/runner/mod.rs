//! Long-running consumers of the monitor's elections.
//!
//! - [`BridgeRunner`]: the proxy listener for one port.
//! - [`StatusLogger`]: the periodic status line.

pub mod bridge;
pub mod status_logger;

pub use bridge::BridgeRunner;
pub use status_logger::{FailoverRecord, FailoverTracker, StatusLogger, StatusReport};
