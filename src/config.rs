//! Configuration for AtlasBlob
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{AtlasError, Result};

/// Main configuration for an AtlasBlob instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all container files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── container_000001.dat   (preallocated blob bytes)
    ///     └── container_000001.idx   (dumped chain of files and holes)
    pub data_dir: PathBuf,

    /// Capacity of every container, in bytes
    pub container_size: u64,

    // -------------------------------------------------------------------------
    // Persistence Configuration
    // -------------------------------------------------------------------------
    /// How often dirty containers are dumped in the background.
    /// Zero disables the background dump thread.
    /// Given in whole seconds in a config file.
    #[serde(deserialize_with = "duration_from_secs")]
    pub dump_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasblob_data"),
            container_size: 1024 * 1024 * 1024, // 1 GiB
            dump_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AtlasError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AtlasError::Config(format!("invalid config '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no container can be built from
    pub fn validate(&self) -> Result<()> {
        if self.container_size == 0 {
            return Err(AtlasError::Config(
                "container_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all containers)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the capacity of each container (in bytes)
    pub fn container_size(mut self, size: u64) -> Self {
        self.config.container_size = size;
        self
    }

    /// Set the background dump interval (zero disables it)
    pub fn dump_interval(mut self, interval: Duration) -> Self {
        self.config.dump_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
