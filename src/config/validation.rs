//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for errors serde
//! cannot catch: missing or duplicate backends, bad hosts, zero ports,
//! clashing proxy ports, missing API credentials and an unusable TLS
//! setup for the Galera agent. Returns a list of [`ValidationError`]
//! values with per-field suggestions.

use std::collections::HashSet;
use std::net::IpAddr;

use url::Host;

use super::model::{Config, GaleraAgentTls};
use crate::error::ValidationError;

/// Validate a backend host name or IP literal.
pub fn validate_host(host: &str) -> Result<(), String> {
    if host.is_empty() {
        return Err("host cannot be empty".into());
    }
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    match Host::parse(host) {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("'{host}' is not a valid host name or IP address")),
    }
}

/// Check that a PEM bundle contains at least one parseable certificate.
pub fn validate_ca_pem(pem: &str) -> Result<usize, String> {
    let mut reader = std::io::BufReader::new(pem.as_bytes());
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("CA bundle is not valid PEM: {e}"))?;
    if certs.is_empty() {
        return Err("CA bundle contains no certificates".into());
    }
    Ok(certs.len())
}

fn error(section: &str, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        section: section.into(),
        field: field.into(),
        message: message.into(),
        suggestion: None,
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_proxy(config, &mut errors);
    validate_api(config, &mut errors);
    validate_tls(&config.galera_agent_tls, &mut errors);

    if config.health_port == Some(0) {
        errors.push(error("(root)", "health_port", "port must be non-zero"));
    }

    if config.status_log_interval_secs == 0 {
        errors.push(ValidationError {
            suggestion: Some("the default is 30".into()),
            ..error("(root)", "status_log_interval_secs", "interval must be non-zero")
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_proxy(config: &Config, errors: &mut Vec<ValidationError>) {
    let proxy = &config.proxy;

    if proxy.port == 0 {
        errors.push(error("proxy", "port", "port must be non-zero"));
    }

    match proxy.inactive_mysql_port {
        Some(0) => errors.push(error("proxy", "inactive_mysql_port", "port must be non-zero")),
        Some(p) if p == proxy.port => errors.push(ValidationError {
            suggestion: Some("remove inactive_mysql_port to disable the inactive proxy".into()),
            ..error(
                "proxy",
                "inactive_mysql_port",
                format!("inactive port {p} clashes with the active proxy port"),
            )
        }),
        _ => {}
    }

    if proxy.healthcheck_timeout_millis == 0 {
        errors.push(ValidationError {
            suggestion: Some("the default is 5000".into()),
            ..error(
                "proxy",
                "healthcheck_timeout_millis",
                "timeout must be non-zero",
            )
        });
    }

    if proxy.backends.is_empty() {
        errors.push(error(
            "proxy",
            "backends",
            "at least one backend must be defined",
        ));
        return;
    }

    let mut seen_names = HashSet::new();
    for (i, backend) in proxy.backends.iter().enumerate() {
        let section = if backend.name.is_empty() {
            format!("backends[{i}]")
        } else {
            backend.name.clone()
        };

        if backend.name.is_empty() {
            errors.push(error(&section, "name", "backend name cannot be empty"));
        } else if !seen_names.insert(backend.name.as_str()) {
            errors.push(error(&section, "name", "duplicate backend name"));
        }

        if let Err(msg) = validate_host(&backend.host) {
            errors.push(error(&section, "host", msg));
        }
        if backend.port == 0 {
            errors.push(error(&section, "port", "port must be non-zero"));
        }
        if backend.status_port == 0 {
            errors.push(error(&section, "status_port", "port must be non-zero"));
        }
    }
}

fn validate_api(config: &Config, errors: &mut Vec<ValidationError>) {
    let api = &config.api;
    if api.port == 0 {
        errors.push(error("api", "port", "port must be non-zero"));
    }
    if api.username.is_empty() {
        errors.push(error("api", "username", "username cannot be empty"));
    }
    if api.password.is_empty() {
        errors.push(error("api", "password", "password cannot be empty"));
    }
}

fn validate_tls(tls: &GaleraAgentTls, errors: &mut Vec<ValidationError>) {
    if !tls.enabled {
        return;
    }
    if tls.server_name.is_empty() {
        errors.push(ValidationError {
            suggestion: Some("set it to the name on the agent's certificate".into()),
            ..error(
                "galera_agent_tls",
                "server_name",
                "server_name is required when TLS is enabled",
            )
        });
    }
    if tls.ca.is_empty() {
        errors.push(error(
            "galera_agent_tls",
            "ca",
            "ca is required when TLS is enabled",
        ));
    } else if let Err(msg) = validate_ca_pem(&tls.ca) {
        errors.push(error("galera_agent_tls", "ca", msg));
    }
}

/// Settings that are valid but probably not what the operator meant.
#[must_use]
pub fn warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    let backends = config.proxy.backends.len();

    if backends == 1 {
        warnings.push("only one backend is configured, so there is nothing to fail over to".into());
    }
    if config.proxy.inactive_mysql_port.is_some() && backends < 2 {
        warnings.push("the inactive port needs a second backend to reach a different node".into());
    }
    if config.health_port == Some(config.api.port) {
        warnings.push(format!(
            "health_port {} equals the API port; /health is already served there",
            config.api.port
        ));
    }

    warnings
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let proxy = &config.proxy;
    let mut lines = vec![format!("  {} backends\n", proxy.backends.len())];

    lines.push(format!(
        "  active proxy:   {}:{}",
        config.bind_address, proxy.port
    ));
    if let Some(port) = proxy.inactive_mysql_port {
        lines.push(format!("  inactive proxy: {}:{port}", config.bind_address));
    }
    lines.push(format!("  api:            {}:{}", config.bind_address, config.api.port));
    lines.push(format!(
        "  healthcheck:    {}ms timeout{}",
        proxy.healthcheck_timeout_millis,
        if config.galera_agent_tls.enabled {
            ", tls"
        } else {
            ""
        }
    ));
    lines.push(String::new());

    for backend in &proxy.backends {
        lines.push(format!(
            "  {}  -> {}:{} (status: {}/{})",
            backend.name,
            backend.host,
            backend.port,
            backend.status_port,
            backend.status_endpoint.trim_start_matches('/'),
        ));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
