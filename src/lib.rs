//! Switchboard is an active/passive TCP proxy for MySQL Galera clusters.
//!
//! It polls every Galera node's agent for health and a write-ordering
//! index, elects one active backend, and bridges every client connection
//! on the proxy port to that backend. When the election changes, every
//! bridge to the previous backend is severed so clients reconnect to the
//! new one. An optional inactive port follows a secondary node, and an
//! authenticated admin API lets operators switch traffic off and on.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- Configuration loading and validation via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`domain`] -- Backends, bridges and the dialer seams they use.
//! - [`monitor`] -- Health polling and active backend election.
//! - [`runner`] -- The proxy accept loop and the periodic status logger.
//! - [`api`] -- Admin endpoints: traffic switch, backend snapshots, basic auth.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`metrics`] -- Prometheus recorder and session gauges.
//! - [`server`] -- Axum routers, shared application state, the agent HTTP
//!   client, and graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `sentry-integration` | Sentry error tracking |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod runner;
pub mod server;

#[cfg(feature = "sentry-integration")]
pub mod sentry_integration;
