//! Configuration structures for wasmflare.
//!
//! This module defines configuration options for various components:
//! - [`ProjectConfig`]: Build output layout (directories and file names)
//! - [`ApiConfig`]: Platform REST API endpoint, timeouts and token naming
//! - [`LocalRuntimeConfig`]: Limits for the local dispatch host
//! - [`StoreConfig`]: Location of the on-disk credential store

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Build output layout.
///
/// The compiled module and the generated script are written side by side
/// into `output_dir`, relative to `app_root_dir`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Application root directory.
    #[serde(default = "defaults::app_root_dir")]
    pub app_root_dir: String,

    /// Output directory for the script and the module, relative to the root.
    #[serde(default = "defaults::output_dir")]
    pub output_dir: String,

    /// File name of the compiled binary module.
    #[serde(default = "defaults::wasm_file_name")]
    pub wasm_file_name: String,

    /// File name of the generated script.
    #[serde(default = "defaults::script_file_name")]
    pub script_file_name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            app_root_dir: defaults::app_root_dir(),
            output_dir: defaults::output_dir(),
            wasm_file_name: defaults::wasm_file_name(),
            script_file_name: defaults::script_file_name(),
        }
    }
}

impl ProjectConfig {
    /// Absolute-or-relative path of the output directory.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.app_root_dir).join(&self.output_dir)
    }

    /// Path of the generated script.
    pub fn script_path(&self) -> PathBuf {
        self.output_path().join(&self.script_file_name)
    }

    /// Path of the compiled module.
    pub fn wasm_path(&self) -> PathBuf {
        self.output_path().join(&self.wasm_file_name)
    }
}

/// Platform REST API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the REST API (all endpoint paths are appended to it).
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Overall request timeout in seconds.
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Name given to the scoped deployment token.
    #[serde(default = "defaults::token_name")]
    pub token_name: String,

    /// Substring identifying the capability in permission group names.
    #[serde(default = "defaults::capability_marker")]
    pub capability_marker: String,

    /// Substring identifying the action in permission group names.
    #[serde(default = "defaults::action_marker")]
    pub action_marker: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            timeout_secs: defaults::timeout_secs(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
            token_name: defaults::token_name(),
            capability_marker: defaults::capability_marker(),
            action_marker: defaults::action_marker(),
        }
    }
}

impl ApiConfig {
    /// Point the configuration at a different API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Get the request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the connection timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Local dispatch host configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalRuntimeConfig {
    /// Enable fuel metering for each invocation's instance.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Maximum fuel per invocation.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Deadline for the readiness signal in milliseconds.
    ///
    /// `None` waits indefinitely.
    #[serde(default)]
    pub ready_timeout_ms: Option<u64>,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        Self {
            fuel_metering: defaults::fuel_metering(),
            max_fuel: defaults::max_fuel(),
            ready_timeout_ms: None,
        }
    }
}

impl LocalRuntimeConfig {
    /// Get the readiness deadline as a `Duration`, if one is configured.
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }
}

/// Credential store location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path of the credential file.
    ///
    /// Defaults to `credentials.json` in the platform configuration directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Default value functions for serde.
mod defaults {
    pub fn app_root_dir() -> String {
        ".".to_string()
    }

    pub fn output_dir() -> String {
        "deploy/cloudflare".to_string()
    }

    pub fn wasm_file_name() -> String {
        "worker.wasm".to_string()
    }

    pub fn script_file_name() -> String {
        "_worker.js".to_string()
    }

    pub fn base_url() -> String {
        "https://api.cloudflare.com/client/v4".to_string()
    }

    pub const fn timeout_secs() -> u64 {
        30
    }

    pub const fn connect_timeout_secs() -> u64 {
        10
    }

    pub fn token_name() -> String {
        "wasmflare-pages-deploy".to_string()
    }

    pub fn capability_marker() -> String {
        "Pages".to_string()
    }

    pub fn action_marker() -> String {
        "Edit".to_string()
    }

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }
}
