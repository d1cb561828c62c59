//! Configuration types for cfgtrail.
//!
//! Configuration is resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A YAML file (path taken from `CFGTRAIL_CONFIG` when set)
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `region` | `store.region` |
//! | `target_table` | `store.table` |
//! | `CFGTRAIL_STORE_DIR` | `store.directory` |
//! | `CFGTRAIL_STORE_BACKEND` | `store.backend` (`file` / `memory`) |
//! | `CFGTRAIL_FAILURE_POLICY` | `pipeline.failure_policy` (`fail_fast` / `isolate`) |

pub mod pipeline;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use pipeline::{FailurePolicy, PipelineConfig};
pub use store::{StorageBackend, StoreConfig};

/// Environment variable naming the YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "CFGTRAIL_CONFIG";

/// Complete cfgtrail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TrailConfig {
    /// Audit store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Batch processing settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrailConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::from)
    }

    /// Resolve the full configuration through a variable lookup.
    ///
    /// Reads the YAML file named by `CFGTRAIL_CONFIG` if the lookup yields
    /// one, then applies the environment overrides and validates the result.
    /// Pass `|name| std::env::var(name).ok()` to read the process environment.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env_from(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields using the given variable lookup.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(region) = present("region") {
            self.store.region = region.trim().to_string();
        }
        if let Some(table) = present("target_table") {
            self.store.table = table.trim().to_string();
        }
        if let Some(dir) = present("CFGTRAIL_STORE_DIR") {
            self.store.directory = PathBuf::from(dir.trim());
        }
        if let Some(backend) = present("CFGTRAIL_STORE_BACKEND") {
            self.store.backend = StorageBackend::parse(&backend).ok_or_else(|| {
                ConfigError::Config(format!("unknown store backend '{}'", backend))
            })?;
        }
        if let Some(policy) = present("CFGTRAIL_FAILURE_POLICY") {
            self.pipeline.failure_policy = FailurePolicy::parse(&policy).ok_or_else(|| {
                ConfigError::Config(format!("unknown failure policy '{}'", policy))
            })?;
        }

        Ok(())
    }

    /// Check the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.table.trim().is_empty() {
            return Err(ConfigError::Config(
                "audit table name must not be empty".to_string(),
            ));
        }
        if self.store.table.contains(['/', '\\']) {
            return Err(ConfigError::Config(format!(
                "audit table name '{}' must not contain path separators",
                self.store.table
            )));
        }
        Ok(())
    }
}
