//! Generic async file-based config source.
//!
//! [`FileSource`] implements [`ConfigSource`] for every supported file
//! format, dispatching on the format through [`parse_config_str`]. It
//! reads the file asynchronously via Tokio and hashes the raw bytes into a
//! [`ConfigVersion`] so a running instance can report what it loaded.
//! Validation happens in [`crate::config::load`], after overrides.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{parse_config_str, sha256_hex};
use crate::config::model::Config;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::SwitchboardError;

pub struct FileSource {
    path: PathBuf,
    /// Format name, also the extension handed to [`parse_config_str`].
    format: &'static str,
}

impl FileSource {
    #[must_use]
    pub const fn new(path: PathBuf, format: &'static str) -> Self {
        Self { path, format }
    }

    async fn read_content(&self) -> Result<String, SwitchboardError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SwitchboardError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                SwitchboardError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.format
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), SwitchboardError> {
        let content = self.read_content().await?;

        let config = parse_config_str(self.format, &content, &self.path.display().to_string())?;

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }
}
