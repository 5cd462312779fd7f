//! `switchboard init`: generate a starter configuration file.
//!
//! Creates a YAML, JSON, or TOML config file with either minimal
//! or fully documented templates.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::SwitchboardError;

pub fn execute(args: &InitArgs) -> Result<(), SwitchboardError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("switchboard.{}", args.format.extension())));

    if output.exists() && !args.force {
        return Err(SwitchboardError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format, args.full))?;
    println!("Created {}", output.display());
    Ok(())
}

const fn template(format: &ConfigFormat, full: bool) -> &'static str {
    match (format, full) {
        (ConfigFormat::Yaml, false) => YAML_MINIMAL,
        (ConfigFormat::Yaml, true) => YAML_FULL,
        (ConfigFormat::Json, false) => JSON_MINIMAL,
        (ConfigFormat::Json, true) => JSON_FULL,
        (ConfigFormat::Toml, false) => TOML_MINIMAL,
        (ConfigFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# Switchboard config: https://github.com/julienandreu/switchboard

proxy:
  port: 3306
  backends:
    - name: "mysql-0"
      host: "10.0.0.10"
      port: 3306
      status_port: 9200

api:
  port: 8080
  username: "admin"
  password: "changeme"
"#;

const YAML_FULL: &str = r#"# Switchboard config: https://github.com/julienandreu/switchboard
#
# Values shown as comments are defaults. Uncomment and modify as needed.

# bind_address: "0.0.0.0"      # Address every listener binds to
# health_port: 8081            # Extra unauthenticated /health listener
# status_log_interval_secs: 30 # How often backend status is logged

proxy:
  port: 3306                   # Clients reach the active (primary) node here
  inactive_mysql_port: 3307    # Optional port that follows a secondary node
  # healthcheck_timeout_millis: 5000   # Agent timeout; polling runs 5x faster
  # shutdown_delay_seconds: 0          # Keep accepting this long after SIGTERM
  backends:
    - name: "mysql-0"
      host: "10.0.0.10"
      port: 3306
      status_port: 9200
      # status_endpoint: "api/v1/status"
    - name: "mysql-1"
      host: "10.0.0.11"
      port: 3306
      status_port: 9200
    - name: "mysql-2"
      host: "10.0.0.12"
      port: 3306
      status_port: 9200

api:
  port: 8080
  username: "admin"            # Overridden by SWITCHBOARD_API_USERNAME
  password: "changeme"         # Overridden by SWITCHBOARD_API_PASSWORD

# Poll the Galera agent over HTTPS
# galera_agent_tls:
#   enabled: true
#   server_name: "galera-agent"
#   ca: |
#     -----BEGIN CERTIFICATE-----
#     ...
#     -----END CERTIFICATE-----
"#;

const JSON_MINIMAL: &str = r#"{
  "proxy": {
    "port": 3306,
    "backends": [
      { "name": "mysql-0", "host": "10.0.0.10", "port": 3306, "status_port": 9200 }
    ]
  },
  "api": {
    "port": 8080,
    "username": "admin",
    "password": "changeme"
  }
}
"#;

const JSON_FULL: &str = r#"{
  "bind_address": "0.0.0.0",
  "health_port": 8081,
  "status_log_interval_secs": 30,
  "proxy": {
    "port": 3306,
    "inactive_mysql_port": 3307,
    "healthcheck_timeout_millis": 5000,
    "shutdown_delay_seconds": 0,
    "backends": [
      { "name": "mysql-0", "host": "10.0.0.10", "port": 3306, "status_port": 9200, "status_endpoint": "api/v1/status" },
      { "name": "mysql-1", "host": "10.0.0.11", "port": 3306, "status_port": 9200, "status_endpoint": "api/v1/status" },
      { "name": "mysql-2", "host": "10.0.0.12", "port": 3306, "status_port": 9200, "status_endpoint": "api/v1/status" }
    ]
  },
  "api": {
    "port": 8080,
    "username": "admin",
    "password": "changeme"
  },
  "galera_agent_tls": {
    "enabled": false
  }
}
"#;

const TOML_MINIMAL: &str = r#"# Switchboard config: https://github.com/julienandreu/switchboard

[proxy]
port = 3306

[[proxy.backends]]
name = "mysql-0"
host = "10.0.0.10"
port = 3306
status_port = 9200

[api]
port = 8080
username = "admin"
password = "changeme"
"#;

const TOML_FULL: &str = r#"# Switchboard config: https://github.com/julienandreu/switchboard
#
# Values shown as comments are defaults. Uncomment and modify as needed.

# bind_address = "0.0.0.0"
# health_port = 8081
# status_log_interval_secs = 30

[proxy]
port = 3306
inactive_mysql_port = 3307
# healthcheck_timeout_millis = 5000
# shutdown_delay_seconds = 0

[[proxy.backends]]
name = "mysql-0"
host = "10.0.0.10"
port = 3306
status_port = 9200
# status_endpoint = "api/v1/status"

[[proxy.backends]]
name = "mysql-1"
host = "10.0.0.11"
port = 3306
status_port = 9200

[[proxy.backends]]
name = "mysql-2"
host = "10.0.0.12"
port = 3306
status_port = 9200

[api]
port = 8080
username = "admin"
password = "changeme"

# [galera_agent_tls]
# enabled = true
# server_name = "galera-agent"
# ca = """
# -----BEGIN CERTIFICATE-----
# ...
# -----END CERTIFICATE-----
# """
"#;
