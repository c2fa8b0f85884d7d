//! Runtime configuration types.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or saving a [`VmConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Runtime configuration for the VM.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum call depth before `Stack overflow.`
    pub frames_max: usize,
    /// Bytes allocated before the first collection.
    pub initial_gc_threshold: usize,
    /// Floor for the threshold recomputed after each collection.
    pub min_gc_threshold: usize,
    /// Next threshold = live bytes * this factor.
    pub gc_grow_factor: usize,
    /// Whether GC is enabled (default: true)
    pub gc_enabled: bool,
    /// Collect before every instruction.
    pub gc_stress: bool,
    /// Log a GC summary when the VM is dropped.
    pub gc_stats: bool,
    /// Log every executed instruction at trace level.
    pub trace_execution: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            frames_max: 64,
            initial_gc_threshold: 1024 * 1024,
            min_gc_threshold: 1024 * 1024,
            gc_grow_factor: 2,
            gc_enabled: true,
            gc_stress: false,
            gc_stats: false,
            trace_execution: false,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Save as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_max == 0 {
            return Err(ConfigError::Invalid("frames_max must be at least 1"));
        }
        if self.gc_grow_factor == 0 {
            return Err(ConfigError::Invalid("gc_grow_factor must be at least 1"));
        }
        Ok(())
    }
}
