//! Sources of the host runtime shim.
//!
//! The first block of the generated script is the compiler's own runtime
//! support file (for Go toolchains, `wasm_exec.js`). It is produced outside
//! this crate; a [`HostShimSource`] hands it over as text.

use std::path::{Path, PathBuf};

use tracing::debug;

use wasmflare_common::ShimError;

/// Provides the host runtime shim text.
pub trait HostShimSource {
    /// Return the shim text.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::HostShimUnavailable`] if the shim cannot be obtained.
    fn host_shim(&self) -> Result<String, ShimError>;
}

/// Reads the shim from a file shipped with the compiler.
#[derive(Debug, Clone)]
pub struct FileHostShim {
    path: PathBuf,
}

impl FileHostShim {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path the shim is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HostShimSource for FileHostShim {
    fn host_shim(&self) -> Result<String, ShimError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| ShimError::HostShimUnavailable {
            reason: format!("{}: {e}", self.path.display()),
        })?;
        debug!(path = %self.path.display(), size = text.len(), "Host shim read");
        Ok(text)
    }
}

/// Shim text held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticHostShim(String);

impl StaticHostShim {
    /// Wrap shim text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl HostShimSource for StaticHostShim {
    fn host_shim(&self) -> Result<String, ShimError> {
        Ok(self.0.clone())
    }
}
