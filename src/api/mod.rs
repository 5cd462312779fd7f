//! Administrative HTTP API.
//!
//! - `GET /v0/cluster` / `PATCH /v0/cluster`: traffic switch and the
//!   currently elected backend ([`cluster`]).
//! - `GET /v0/backends`: per-backend snapshots ([`backends`]).
//! - `GET /metrics`: Prometheus exposition.
//!
//! The `/v0` routes sit behind [`basic_auth_guard`].

pub mod backends;
pub mod cluster;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::server::AppState;
pub use cluster::{ActiveBackendJson, ClusterApi, ClusterJson};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Middleware that enforces HTTP Basic Auth with the configured API
/// credentials. Requests must include a valid `Authorization: Basic` header.
pub async fn basic_auth_guard(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"switchboard\"")],
        )
            .into_response()
    };

    let Some(header_value) = request.headers().get(header::AUTHORIZATION) else {
        return unauthorized();
    };
    let Ok(header_str) = header_value.to_str() else {
        return unauthorized();
    };
    let Some(encoded) = header_str.strip_prefix("Basic ") else {
        return unauthorized();
    };
    let Some(decoded) = base64_decode(encoded.trim()) else {
        return unauthorized();
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return unauthorized();
    };

    let expected = &state.credentials;
    if user == expected.username && pass == expected.password {
        next.run(request).await
    } else {
        tracing::debug!(user, "rejected API credentials");
        unauthorized()
    }
}

/// Minimal base64 decoder for Basic auth (RFC 7617).
fn base64_decode(input: &str) -> Option<String> {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let input = input.trim_end_matches('=');
    let mut buf: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(input.len() * 3 / 4);

    for byte in input.bytes() {
        let val = u32::try_from(TABLE.iter().position(|&b| b == byte)?).ok()?;
        buf = (buf << 6) | val;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push(u8::try_from(buf >> bits).ok()?);
            buf &= (1 << bits) - 1;
        }
    }

    String::from_utf8(out).ok()
}

/// Parse a boolean the way operators' existing tooling sends it:
/// `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.as_ref() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
