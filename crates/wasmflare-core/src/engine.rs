//! Wasmtime engine configuration.
//!
//! One [`WasmEngine`] is shared by every invocation of a local host. It
//! holds no per-invocation state.

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use wasmflare_common::{DispatchError, LocalRuntimeConfig};

/// Shared Wasmtime engine.
///
/// Configured with:
/// - **Async support**: instances run on the tokio runtime
/// - **Fuel metering**: when enabled in [`LocalRuntimeConfig`]
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: LocalRuntimeConfig,
}

impl WasmEngine {
    /// Create an engine for the given runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if Wasmtime rejects the configuration.
    pub fn new(config: &LocalRuntimeConfig) -> Result<Self, DispatchError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);
        wasmtime_config.consume_fuel(config.fuel_metering);
        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| DispatchError::load_failed(format!("Failed to create Wasmtime engine: {e}")))?;

        info!(
            fuel_metering = config.fuel_metering,
            max_fuel = config.max_fuel,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &LocalRuntimeConfig {
        &self.config
    }

    /// Check if fuel metering is enabled.
    pub fn is_fuel_metered(&self) -> bool {
        self.config.fuel_metering
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("fuel_metering", &self.config.fuel_metering)
            .field("max_fuel", &self.config.max_fuel)
            .finish_non_exhaustive()
    }
}
