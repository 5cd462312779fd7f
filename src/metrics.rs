//! Prometheus metrics for the proxy.
//!
//! The recorder is installed once at startup and rendered by `GET /metrics`
//! on the admin API. Recording goes through the `metrics` facade, so
//! components never hold a handle.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::SwitchboardError;

/// Live bridge count per backend.
pub const BACKEND_SESSIONS: &str = "backend_sessions_total";

pub fn install_recorder() -> Result<PrometheusHandle, SwitchboardError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| SwitchboardError::Metrics(e.to_string()))
}

#[allow(clippy::cast_precision_loss)]
pub fn record_backend_sessions(backend: &str, sessions: usize) {
    ::metrics::gauge!(BACKEND_SESSIONS, "backend" => backend.to_string()).set(sessions as f64);
}
