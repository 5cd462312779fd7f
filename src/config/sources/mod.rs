//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides the file-based [`FileSource`](file_source::FileSource) and the
//! [`parse_config_str`] helper that deserializes YAML, JSON or TOML
//! depending on which format features are enabled.

pub mod file_source;

use sha2::{Digest, Sha256};

use crate::config::model::Config;
use crate::error::SwitchboardError;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, SwitchboardError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| SwitchboardError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| SwitchboardError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| SwitchboardError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(SwitchboardError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn unsupported_extension() {
        let err = parse_config_str("ini", "", "switchboard.ini").unwrap_err();
        assert!(matches!(err, SwitchboardError::UnsupportedFormat(_)));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_parse_error_names_the_file() {
        let err = parse_config_str("yaml", "proxy: [", "bad.yaml").unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }
}
