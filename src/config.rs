//! Build configuration: what script to run, how long to let it run, and how
//! many old builds to keep around.
//!
//! Loaded from a TOML file supplied on the command line, validated before the
//! build takes any side effect.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_NUM_BUILDS_TO_KEEP: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("build_script is required and must be non-empty")]
    MissingBuildScript,

    #[error("timeout_in_secs must be at least 1, got {0}")]
    InvalidTimeout(u64),

    #[error("num_builds_to_keep must be at least 1, got {0}")]
    InvalidKeepCount(usize),
}

/// Validated build configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Script executed inside the source directory.
    pub build_script: PathBuf,

    /// Arguments passed to the build script.
    #[serde(default)]
    pub build_script_args: Vec<String>,

    /// Wall-clock limit for the build script, in seconds.
    pub timeout_in_secs: u64,

    /// How many builds per project to retain when pruning.
    #[serde(default = "default_num_builds_to_keep")]
    pub num_builds_to_keep: usize,
}

fn default_num_builds_to_keep() -> usize {
    DEFAULT_NUM_BUILDS_TO_KEEP
}

impl Config {
    /// Load and validate a config file. Validation failures are reported
    /// before any build side effect happens.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.build_script.as_os_str().is_empty() {
            return Err(ConfigError::MissingBuildScript);
        }
        if self.timeout_in_secs == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_in_secs));
        }
        if self.num_builds_to_keep == 0 {
            return Err(ConfigError::InvalidKeepCount(self.num_builds_to_keep));
        }
        Ok(())
    }
}
