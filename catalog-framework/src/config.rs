//! TOML configuration for the catalog core.
//!
//! ```toml
//! [pipeline]
//! pool_size = 4
//! queue_capacity = 256
//! graceful_timeout_ms = 30000
//! force_timeout_ms = 2000
//! service_subject = "catalog-indexer"
//!
//! [reconciler]
//! max_concurrency = 1
//! ```
//!
//! Every key is optional.

use catalog_processing::PipelineConfig;
use catalog_publication::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub pipeline: PipelineConfig,
    pub reconciler: ReconcilerConfig,
}

impl CatalogConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads a config file, failing on a missing or malformed file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Loads a config file, falling back to defaults when the file is missing
    /// or cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No catalog config found, using defaults");
            return Self::default();
        }

        match Self::read(path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded catalog config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load catalog config, using defaults");
                Self::default()
            }
        }
    }
}
