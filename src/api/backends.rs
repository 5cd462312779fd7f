//! `GET /v0/backends`: a snapshot of every configured backend.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::domain::BackendJson;
use crate::server::AppState;

pub async fn backends_handler(State(state): State<Arc<AppState>>) -> Json<Vec<BackendJson>> {
    Json(state.backends.iter().map(|b| b.as_json()).collect())
}
