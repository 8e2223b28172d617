//! Bridge Configuration
//!
//! Handles parsing and management of ferrule.toml configuration files. The
//! bridge only needs two things from configuration: the installation root
//! that anchors library path resolution, and which backend to construct at
//! context startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Unknown backend kind: {0}")]
    UnknownBackend(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which downcall backend the context constructs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Direct native calls through the companion runtime library.
    Native,
    /// In-process reimplementation of the native entry points; no companion
    /// artifact required.
    #[default]
    Portable,
}

impl BackendKind {
    pub fn parse(s: &str) -> ConfigResult<Self> {
        match s {
            "native" => Ok(BackendKind::Native),
            "portable" => Ok(BackendKind::Portable),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Root configuration structure matching ferrule.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Installation layout
    #[serde(default)]
    pub install: InstallConfig,

    /// Backend selection
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Installation layout. Library path resolution never leaves this root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Installation root; native libraries resolve under `<root>/lib`.
    pub root: PathBuf,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/usr/local/ferrule"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    /// Backend constructed at context startup.
    #[serde(default)]
    pub kind: BackendKind,
}

impl BridgeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from `ferrule.toml` in the given directory, falling back to
    /// defaults when the file does not exist.
    pub fn load_or_default(dir: &Path) -> ConfigResult<Self> {
        let path = dir.join("ferrule.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
