//! Common types, errors, and utilities for wasmflare.
//!
//! This crate provides shared functionality used across the wasmflare workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration sections and the TOML configuration file
//! - The credential store contract and its in-memory / on-disk implementations
//! - Trigger kinds shared by the shim generator and the dispatcher

pub mod config;
pub mod config_file;
pub mod credentials;
pub mod error;
pub mod trigger;

pub use config::{ApiConfig, LocalRuntimeConfig, ProjectConfig, StoreConfig};
pub use config_file::{ConfigFile, ConfigFileError};
pub use credentials::{CredentialKey, CredentialStore, FileStore, MemoryStore, Secret};
pub use error::{DispatchError, FlareError, ShimError, StoreError};
pub use trigger::TriggerKind;
