//! `switchboard validate`: check a configuration file for errors.
//!
//! Parses and validates the config file, reporting results in either
//! human-readable text or machine-readable JSON format.

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::sources::parse_config_str;
use crate::config::validation;
use crate::error::SwitchboardError;

pub fn execute(args: &ValidateArgs) -> Result<(), SwitchboardError> {
    let path = &args.config;

    if !path.exists() {
        return Err(SwitchboardError::ConfigFileNotFound { path: path.clone() });
    }

    let content = std::fs::read_to_string(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = parse_config_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validation::validate(&config) {
        match args.format {
            ValidateFormat::Text => {
                eprintln!("\u{2717} {} has {} errors\n", path.display(), errors.len());
                for error in &errors {
                    eprintln!("{error}");
                }
            }
            ValidateFormat::Json => {
                let json_errors: Vec<serde_json::Value> = errors
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "section": e.section,
                            "field": e.field,
                            "message": e.message,
                            "suggestion": e.suggestion,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "valid": false,
                        "errors": json_errors,
                    })
                );
            }
        }
        return Err(SwitchboardError::ConfigValidation { errors });
    }

    let warnings = validation::warnings(&config);

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path.display().to_string(), &config)
            );
            for warning in &warnings {
                eprintln!("  warning: {warning}");
            }
        }
        ValidateFormat::Json => {
            let backends: Vec<&str> = config
                .proxy
                .backends
                .iter()
                .map(|b| b.name.as_str())
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "backends": backends,
                    "proxy_port": config.proxy.port,
                    "inactive_proxy_port": config.proxy.inactive_mysql_port,
                    "api_port": config.api.port,
                    "warnings": warnings,
                })
            );
        }
    }

    Ok(())
}
