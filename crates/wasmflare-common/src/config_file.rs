//! Configuration file structures for wasmflare.
//!
//! This module defines the TOML configuration file:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ConfigFileError`]: Read and parse failures

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ApiConfig, LocalRuntimeConfig, ProjectConfig, StoreConfig};

/// Top-level configuration file structure.
///
/// Every section is optional; missing sections and fields take their defaults.
///
/// # Example
///
/// ```toml
/// [project]
/// output_dir = "deploy/cloudflare"
/// wasm_file_name = "worker.wasm"
///
/// [api]
/// base_url = "https://api.cloudflare.com/client/v4"
/// timeout_secs = 30
///
/// [runtime]
/// max_fuel = 10_000_000
/// ready_timeout_ms = 5000
///
/// [store]
/// path = "/home/me/.config/wasmflare/credentials.json"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Build output layout.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Platform API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Local dispatch host settings.
    #[serde(default)]
    pub runtime: LocalRuntimeConfig,

    /// Credential store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Load configuration from a TOML file if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
