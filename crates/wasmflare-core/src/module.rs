//! Module compilation.
//!
//! [`CompiledModule`] wraps a Wasmtime core [`Module`] with the hash of the
//! bytes it was compiled from. Compilation happens once per dispatcher; the
//! compiled module is shared by every instance.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use wasmflare_common::DispatchError;

/// Where a local host gets its module from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Binary module on disk, read on load.
    File(PathBuf),
    /// Binary module in memory.
    Bytes(Vec<u8>),
    /// Text format, compiled on load.
    Wat(String),
}

impl ModuleSource {
    /// Compile the module described by this source.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::LoadFailed`] if the module cannot be read or compiled.
    pub async fn compile(&self, engine: &Engine) -> Result<CompiledModule, DispatchError> {
        match self {
            ModuleSource::File(path) => CompiledModule::from_file(engine, path).await,
            ModuleSource::Bytes(bytes) => CompiledModule::from_bytes(engine, bytes),
            ModuleSource::Wat(wat) => CompiledModule::from_wat(engine, wat),
        }
    }
}

/// A compiled core module.
///
/// Cloning is cheap; clones share the compiled code.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,

    /// Hash of the original bytes.
    content_hash: String,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Compile a core module from binary bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid module.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, DispatchError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes)
            .map_err(|e| DispatchError::load_failed(format!("Core module compilation failed: {e}")))?;

        let content_hash = compute_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Core module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// Read and compile a binary module file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or compiled.
    pub async fn from_file(engine: &Engine, path: &Path) -> Result<Self, DispatchError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DispatchError::load_failed(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_bytes(engine, &bytes)
    }

    /// Compile a core module from WebAssembly text.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, DispatchError> {
        let start = Instant::now();

        let module = Module::new(engine, wat)
            .map_err(|e| DispatchError::load_failed(format!("WAT compilation failed: {e}")))?;

        let content_hash = compute_hash(wat.as_bytes());

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "WAT module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// The Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Hash of the bytes this module was compiled from.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// When this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// Check the `\0asm` magic number and minimum length.
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), DispatchError> {
        if bytes.len() < 8 {
            return Err(DispatchError::load_failed("Invalid Wasm: file too small"));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(DispatchError::load_failed("Invalid Wasm: bad magic number"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
