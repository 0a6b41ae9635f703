//! Bridge configuration (tether.toml)
//!
//! Every key is optional:
//!
//! ```toml
//! gc_threshold = 1024
//! handle_capacity = 64
//! log_filter = "tether_core=debug"
//! diagnostics = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::handles::MAX_HANDLES;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "TETHER_CONFIG";

/// Largest `handle_capacity` reserved up front. The table still grows past
/// it on demand, up to `MAX_HANDLES`.
pub const MAX_HANDLE_CAPACITY: usize = if MAX_HANDLES < 1 << 20 {
    MAX_HANDLES
} else {
    1 << 20
};

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("Invalid config: {0}")]
    Validation(String),
}

/// Runtime options for a `Bridge`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeOptions {
    /// Allocations between automatic collections (0 disables)
    pub gc_threshold: usize,

    /// Initial handle table capacity
    pub handle_capacity: usize,

    /// `env_logger` filter installed by `tether_initialize`
    pub log_filter: String,

    /// Log load contexts and their modules on initialize
    pub diagnostics: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            gc_threshold: 1024,
            handle_capacity: 64,
            log_filter: "warn".to_string(),
            diagnostics: true,
        }
    }
}

impl BridgeOptions {
    /// Parse options from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse options from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let options: BridgeOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from the file named by `TETHER_CONFIG`, or the defaults
    /// when it is unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handle_capacity > MAX_HANDLE_CAPACITY {
            return Err(ConfigError::Validation(format!(
                "handle_capacity {} exceeds the maximum of {}",
                self.handle_capacity, MAX_HANDLE_CAPACITY
            )));
        }

        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "log_filter cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
