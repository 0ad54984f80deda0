//! Worker script generation.
//!
//! [`ShimGenerator::generate`] assembles the script in memory;
//! [`GeneratedShim::write_to`] replaces the destination file atomically.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::host_shim::HostShimSource;
use crate::templates;
use wasmflare_common::{ProjectConfig, ShimError};

/// Separator placed between blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// The three script blocks, in concatenation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedShim {
    host_shim: String,
    adapter: String,
    dispatch: String,
}

impl GeneratedShim {
    /// Blocks in order: host runtime shim, runtime adapter, dispatch template.
    pub fn blocks(&self) -> [&str; 3] {
        [self.host_shim.as_str(), self.adapter.as_str(), self.dispatch.as_str()]
    }

    /// The full script text.
    pub fn render(&self) -> String {
        self.blocks().join(BLOCK_SEPARATOR)
    }

    /// Write the script to `path`, replacing any previous file.
    ///
    /// The text goes to a temporary file in the same directory, which is
    /// then renamed over `path`. Readers never see a partial script.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::Write`] if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), ShimError> {
        let write_err = |source| ShimError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        file.write_all(self.render().as_bytes()).map_err(write_err)?;
        file.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// Generates worker scripts around a compiled module.
#[derive(Debug, Clone)]
pub struct ShimGenerator<S> {
    source: S,
}

impl<S: HostShimSource> ShimGenerator<S> {
    /// Create a generator taking the host runtime shim from `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Assemble the script for the module named `wasm_file_name`.
    ///
    /// The name is not validated; a bad reference fails when the platform
    /// loads the script.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::HostShimUnavailable`] if the host shim cannot be obtained.
    pub fn generate(&self, wasm_file_name: &str) -> Result<GeneratedShim, ShimError> {
        Ok(GeneratedShim {
            host_shim: self.source.host_shim()?,
            adapter: templates::runtime_adapter(wasm_file_name),
            dispatch: templates::DISPATCH_TEMPLATE.to_string(),
        })
    }
}

/// Generate the Pages worker script into the project's output directory.
///
/// Creates the output directory if needed and returns the written path.
///
/// # Errors
///
/// Returns the host shim or write error.
#[instrument(skip_all, fields(output = %project.output_path().display()))]
pub fn generate_pages_script<S: HostShimSource>(
    project: &ProjectConfig,
    source: S,
) -> Result<PathBuf, ShimError> {
    let output = project.output_path();
    std::fs::create_dir_all(&output).map_err(|e| ShimError::Write {
        path: output.clone(),
        source: e,
    })?;

    let shim = ShimGenerator::new(source).generate(&project.wasm_file_name)?;
    let path = project.script_path();
    shim.write_to(&path)?;

    info!(path = %path.display(), module = %project.wasm_file_name, "Worker script generated");
    Ok(path)
}
