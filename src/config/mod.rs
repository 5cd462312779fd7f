//! Configuration loading and validation.
//!
//! Defines the [`ConfigSource`] trait for pluggable config formats and the
//! [`ConfigVersion`] hash reported by `/health`. Submodules provide the
//! data model, validation logic, and concrete file sources.

pub mod model;
pub mod sources;
pub mod validation;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::SwitchboardError;
use model::Config;
#[cfg(any(feature = "yaml", feature = "json", feature = "toml"))]
use sources::file_source::FileSource;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    /// First eight hex digits, enough to tell deployments apart in logs.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

/// Values from the command line or environment that replace what the file
/// says. Applied before validation, so they are held to the same rules.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_username: Option<String>,
    pub api_password: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(username) = &self.api_username {
            config.api.username.clone_from(username);
        }
        if let Some(password) = &self.api_password {
            config.api.password.clone_from(password);
        }
    }
}

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits (Rust 1.75+) does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    /// Parse the source. The result is not validated yet.
    async fn load(&self) -> Result<(Config, ConfigVersion), SwitchboardError>;
}

/// File names probed in the working directory when `--config` is absent.
pub const AUTO_DETECT_FILES: &[&str] = &[
    "switchboard.yaml",
    "switchboard.yml",
    "switchboard.json",
    "switchboard.toml",
];

/// Pick a file source from the path's extension.
pub fn source_for_path(path: &Path) -> Result<Box<dyn ConfigSource>, SwitchboardError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let path = path.to_path_buf();

    match ext.as_str() {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(FileSource::new(path, "yaml"))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(FileSource::new(path, "json"))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(FileSource::new(path, "toml"))),

        other => Err(SwitchboardError::UnsupportedFormat(other.to_string())),
    }
}

/// Resolve the config file: the explicit path if given, otherwise the first
/// auto-detected file in `dir`.
pub fn resolve_path(explicit: Option<&Path>, dir: &Path) -> Result<PathBuf, SwitchboardError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    AUTO_DETECT_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| SwitchboardError::NoConfigSource {
            hint: format!(
                "Pass --config <path> or create one of {} (try `switchboard init`).",
                AUTO_DETECT_FILES.join(", ")
            ),
        })
}

/// Resolve, parse, apply `overrides` and validate.
pub async fn load(
    explicit: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<(Config, ConfigVersion, PathBuf), SwitchboardError> {
    let path = resolve_path(explicit, Path::new("."))?;
    let source = source_for_path(&path)?;
    let (mut config, version) = source.load().await?;
    overrides.apply(&mut config);
    if let Err(errors) = validation::validate(&config) {
        return Err(SwitchboardError::ConfigValidation { errors });
    }
    tracing::debug!(
        source = source.name(),
        path = %path.display(),
        version = version.short(),
        "config loaded"
    );
    Ok((config, version, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = resolve_path(Some(Path::new("custom.yaml")), Path::new("/nonexistent")).unwrap();
        assert_eq!(path, PathBuf::from("custom.yaml"));
    }

    #[test]
    fn missing_config_has_hint() {
        let err = resolve_path(None, Path::new("/nonexistent-switchboard-dir")).unwrap_err();
        match err {
            SwitchboardError::NoConfigSource { hint } => assert!(hint.contains("switchboard init")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = source_for_path(Path::new("config.ini")).err().unwrap();
        assert!(matches!(err, SwitchboardError::UnsupportedFormat(ref e) if e == "ini"));
    }

    #[test]
    fn short_version_truncates() {
        let version = ConfigVersion::Hash("0123456789abcdef".into());
        assert_eq!(version.short(), "01234567");
        assert_eq!(ConfigVersion::Hash("abc".into()).short(), "abc");
    }

    #[cfg(feature = "yaml")]
    fn write_config(api: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("switchboard-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("switchboard.yaml");
        std::fs::write(
            &path,
            format!("proxy:\n  port: 3306\n  backends:\n    - {{name: mysql-0, host: 10.0.0.10, port: 3306, status_port: 9200}}\napi: {api}\n"),
        )
        .unwrap();
        (dir, path)
    }

    #[cfg(feature = "yaml")]
    #[tokio::test]
    async fn load_validates_and_hashes() {
        let (dir, path) = write_config("{port: 8080, username: admin, password: secret}");

        let source = source_for_path(&path).unwrap();
        assert_eq!(source.name(), "yaml");
        let (config, version, _) = load(Some(&path), &ConfigOverrides::default()).await.unwrap();
        assert_eq!(config.proxy.backends[0].name, "mysql-0");
        assert_eq!(version.short().len(), 8);

        std::fs::write(&path, "proxy: {port: 3306, backends: []}\napi: {port: 8080, username: admin, password: secret}\n").unwrap();
        // the source only parses
        assert!(source.load().await.is_ok());
        let err = load(Some(&path), &ConfigOverrides::default()).await.err().unwrap();
        assert!(matches!(err, SwitchboardError::ConfigValidation { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "yaml")]
    #[tokio::test]
    async fn overrides_supply_credentials_missing_from_the_file() {
        let (dir, path) = write_config("{port: 8080}");

        let err = load(Some(&path), &ConfigOverrides::default()).await.err().unwrap();
        assert!(matches!(err, SwitchboardError::ConfigValidation { .. }));

        let overrides = ConfigOverrides {
            api_username: Some("ops".into()),
            api_password: Some("from-env".into()),
        };
        let (config, _, _) = load(Some(&path), &overrides).await.unwrap();
        assert_eq!(config.api.username, "ops");
        assert_eq!(config.api.password, "from-env");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "yaml")]
    #[tokio::test]
    async fn empty_password_override_is_rejected() {
        let (dir, path) = write_config("{port: 8080, username: admin, password: secret}");

        let overrides = ConfigOverrides {
            api_username: None,
            api_password: Some(String::new()),
        };
        let err = load(Some(&path), &overrides).await.err().unwrap();
        match err {
            SwitchboardError::ConfigValidation { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "password");
            }
            other => panic!("unexpected error: {other}"),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
