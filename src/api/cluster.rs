//! Cluster-wide traffic switch.
//!
//! [`ClusterApi`] remembers the active backend (from its own monitor
//! subscription) and the operator's traffic decision, and forwards every
//! decision to the proxy runners.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use super::parse_bool;
use crate::monitor::ActiveBackend;
use crate::server::{shutdown_requested, AppState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBackendJson {
    pub host: String,
    pub port: u16,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterJson {
    pub active_backend: Option<ActiveBackendJson>,
    pub traffic_enabled: bool,
    pub message: String,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ClusterState {
    active_backend: Option<ActiveBackendJson>,
    traffic_enabled: bool,
    message: String,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ClusterApi {
    state: Mutex<ClusterState>,
    // Held across the sends so concurrent toggles reach every runner in the
    // same order they were recorded.
    traffic_subscribers: tokio::sync::Mutex<Vec<mpsc::Sender<bool>>>,
}

impl Default for ClusterApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClusterState {
                active_backend: None,
                traffic_enabled: true,
                message: String::new(),
                last_updated: None,
            }),
            traffic_subscribers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a runner to notify on traffic changes. Registration happens
    /// before the API is shared.
    pub fn register_traffic_enabled_channel(&mut self) -> mpsc::Receiver<bool> {
        let (tx, rx) = mpsc::channel(1);
        self.traffic_subscribers.get_mut().push(tx);
        rx
    }

    /// Follow elections until shutdown.
    pub async fn listen_for_active_backend(
        self: Arc<Self>,
        mut active_backends: mpsc::Receiver<ActiveBackend>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                () = shutdown_requested(&mut shutdown) => break,
                next = active_backends.recv() => match next {
                    Some(next) => self.set_active_backend(next.as_deref().map(|b| {
                        let snapshot = b.as_json();
                        ActiveBackendJson {
                            host: snapshot.host,
                            port: snapshot.port,
                            name: snapshot.name,
                        }
                    })),
                    None => break,
                },
            }
        }
    }

    fn set_active_backend(&self, backend: Option<ActiveBackendJson>) {
        self.state().active_backend = backend;
    }

    pub async fn enable_traffic(&self, message: &str) {
        self.set_traffic(true, message).await;
    }

    pub async fn disable_traffic(&self, message: &str) {
        self.set_traffic(false, message).await;
    }

    async fn set_traffic(&self, enabled: bool, message: &str) {
        let subscribers = self.traffic_subscribers.lock().await;

        {
            let mut state = self.state();
            state.traffic_enabled = enabled;
            state.message = message.to_string();
            state.last_updated = Some(Utc::now());
        }

        tracing::info!(traffic_enabled = enabled, message, "cluster traffic updated");

        for subscriber in subscribers.iter() {
            if subscriber.send(enabled).await.is_err() {
                tracing::debug!("traffic subscriber has gone away");
            }
        }
    }

    #[must_use]
    pub fn as_json(&self) -> ClusterJson {
        let state = self.state();
        ClusterJson {
            active_backend: state.active_backend.clone(),
            traffic_enabled: state.traffic_enabled,
            message: state.message.clone(),
            last_updated: state.last_updated,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClusterUpdate {
    #[serde(rename = "trafficEnabled")]
    pub traffic_enabled: Option<String>,
    pub message: Option<String>,
}

pub async fn get_cluster_handler(State(state): State<Arc<AppState>>) -> Json<ClusterJson> {
    Json(state.cluster.as_json())
}

pub async fn patch_cluster_handler(
    State(state): State<Arc<AppState>>,
    Query(update): Query<ClusterUpdate>,
) -> Response {
    let Some(enabled) = update.traffic_enabled.as_deref().and_then(parse_bool) else {
        return (StatusCode::BAD_REQUEST, "Failed to parse trafficEnabled").into_response();
    };
    let message = update.message.unwrap_or_default();

    if enabled {
        state.cluster.enable_traffic(&message).await;
    } else {
        if message.is_empty() {
            return (StatusCode::BAD_REQUEST, "message must not be empty").into_response();
        }
        state.cluster.disable_traffic(&message).await;
    }

    Json(state.cluster.as_json()).into_response()
}
