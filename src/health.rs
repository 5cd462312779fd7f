//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version and build commit, uptime, config source metadata, backend health counts and
//! the traffic switch as the admin API sees it.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub commit: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub backends: BackendsHealth,
    pub traffic_enabled: bool,
    pub active_backend: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
pub struct BackendsHealth {
    pub total: usize,
    pub healthy: usize,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cluster = state.cluster.as_json();
    let healthy = state.backends.iter().filter(|b| b.healthy()).count();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("SWITCHBOARD_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: state.config_source.clone(),
            version: state.config_version.short().to_string(),
        },
        backends: BackendsHealth {
            total: state.backends.len(),
            healthy,
        },
        traffic_enabled: cluster.traffic_enabled,
        active_backend: cluster.active_backend.map(|b| b.name),
    })
}
