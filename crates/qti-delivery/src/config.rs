//! Engine configuration.

use std::path::{Path, PathBuf};

use qti_eval::DEFAULT_GAS_LIMIT;
use qti_types::MAX_ERRORS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings shared by every session an engine creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Expression evaluation steps allowed per processing run.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Diagnostics stored per validation report.
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
    /// Refuse to start a session whose validation report has errors.
    #[serde(default = "default_refuse_on_errors")]
    pub refuse_on_errors: bool,
    /// Attempts allowed when no itemSessionControl sets a limit. 0 = unlimited.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}
fn default_max_errors() -> usize {
    MAX_ERRORS
}
fn default_refuse_on_errors() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            max_errors: default_max_errors(),
            refuse_on_errors: default_refuse_on_errors(),
            default_max_attempts: default_max_attempts(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
