//! Configuration loading and defaults
//!
//! The configuration is an optional TOML file:
//!
//! ```toml
//! [vm]
//! max_steps = 1000000
//! max_stack = 10000
//! max_call_depth = 1000
//!
//! [debugger]
//! history_file = ".psc_history"
//! prompt = "(psc) "
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub vm: VmConfig,
    pub debugger: DebuggerConfig,
}

/// Virtual machine resource limits
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VmConfig {
    /// Instructions executed per `run`/`step`/`supply_input` call; unlimited
    /// when absent
    pub max_steps: Option<u64>,
    /// Maximum number of values on the value stack
    pub max_stack: usize,
    /// Maximum number of live activations
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_stack: 10_000,
            max_call_depth: 1_000,
        }
    }
}

/// Interactive debugger settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DebuggerConfig {
    pub history_file: Option<PathBuf>,
    pub prompt: String,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            history_file: None,
            prompt: "(psc) ".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text, path)?;
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }
}
