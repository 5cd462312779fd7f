//! Serde data structures for the Switchboard configuration file.
//!
//! Contains [`Config`] (the root), [`ProxyConfig`] with its
//! [`BackendConfig`] list, [`ApiConfig`] and [`GaleraAgentTls`]. All types
//! derive `Serialize` and `Deserialize` with `deny_unknown_fields` for
//! strict parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_healthcheck_timeout() -> u64 {
    5000
}

const fn default_status_log_interval() -> u64 {
    30
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_status_endpoint() -> String {
    "api/v1/status".to_string()
}

fn is_default_healthcheck_timeout(v: &u64) -> bool {
    *v == default_healthcheck_timeout()
}

fn is_default_status_log_interval(v: &u64) -> bool {
    *v == default_status_log_interval()
}

fn is_default_bind_address(v: &str) -> bool {
    v == default_bind_address()
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(
        default = "default_bind_address",
        skip_serializing_if = "is_default_bind_address"
    )]
    pub bind_address: String,

    pub proxy: ProxyConfig,

    pub api: ApiConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_port: Option<u16>,

    #[serde(default, skip_serializing_if = "GaleraAgentTls::is_default")]
    pub galera_agent_tls: GaleraAgentTls,

    #[serde(
        default = "default_status_log_interval",
        skip_serializing_if = "is_default_status_log_interval"
    )]
    pub status_log_interval_secs: u64,
}

impl Config {
    #[must_use]
    pub fn status_log_interval(&self) -> Duration {
        Duration::from_secs(self.status_log_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_mysql_port: Option<u16>,

    #[serde(
        default = "default_healthcheck_timeout",
        skip_serializing_if = "is_default_healthcheck_timeout"
    )]
    pub healthcheck_timeout_millis: u64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub shutdown_delay_seconds: u64,

    pub backends: Vec<BackendConfig>,
}

impl ProxyConfig {
    #[must_use]
    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_millis(self.healthcheck_timeout_millis)
    }

    #[must_use]
    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.shutdown_delay_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status_port: u16,

    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub port: u16,
    /// May be left out of the file and supplied by `SWITCHBOARD_API_USERNAME`.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// TLS settings for talking to the Galera agent's status endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GaleraAgentTls {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,

    /// PEM-encoded CA bundle.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca: String,
}

impl GaleraAgentTls {
    fn is_default(&self) -> bool {
        !self.enabled && self.server_name.is_empty() && self.ca.is_empty()
    }
}
