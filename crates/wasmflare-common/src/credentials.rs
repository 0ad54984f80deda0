//! Credential storage.
//!
//! The scoped deployment credential, the account identifier and the project
//! name are persisted between runs under fixed keys. This module provides:
//! - [`CredentialStore`]: The `get`/`set` contract
//! - [`CredentialKey`]: The persisted key names
//! - [`MemoryStore`]: Concurrent in-memory store
//! - [`FileStore`]: JSON file store with atomic writes
//! - [`Secret`]: A credential value that never prints itself
//!
//! Individual `get`/`set` calls are not atomic as a pair, and nothing here
//! serialises multi-key updates across processes.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::StoreError;

/// Persisted key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// Platform account identifier.
    AccountId,
    /// Scoped Pages deployment credential.
    PagesToken,
    /// Pages project name.
    Project,
    /// Worker deployment credential. Read, never written.
    WorkerToken,
}

impl CredentialKey {
    /// The key under which the value is stored.
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKey::AccountId => "CF_ACCOUNT_ID",
            CredentialKey::PagesToken => "CF_PAGES_TOKEN",
            CredentialKey::Project => "CF_PROJECT",
            CredentialKey::WorkerToken => "CF_WORKER_TOKEN",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat key-value store for credentials and deployment configuration.
pub trait CredentialStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` when the key has never been set.
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError>;

    /// Read a value, treating an empty string as absent.
    fn get_non_empty(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
        Ok(self.get(key)?.filter(|value| !value.is_empty()))
    }
}

/// A credential value.
///
/// `Debug` output is redacted so the value cannot leak through logs or
/// error messages. Use [`Secret::expose`] at the single point of use.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the credential is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of the credential in characters.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<&'static str, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no key has been set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key.as_str()).map(|v| v.clone()))
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.as_str(), value.to_string());
        Ok(())
    }
}

/// Credential store backed by a JSON object on disk.
///
/// Each `set` re-reads the file, updates one key and atomically replaces the
/// file. The replacement file is created owner-readable only.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by the given file. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default credential file location in the platform configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        directories_next::ProjectDirs::from("dev", "wasmflare", "wasmflare")
            .map(|dirs| dirs.config_dir().join("credentials.json"))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(values).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key.as_str()))
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        values.insert(key.as_str().to_string(), value.to_string());
        self.write_all(&values)?;
        debug!(key = %key, path = %self.path.display(), "Credential stored");
        Ok(())
    }
}
