//! Per-invocation store state.
//!
//! Each invocation gets its own [`Store`], holding the invocation context
//! and the instance's half of the readiness handshake.

use wasmtime::Store;

use crate::WasmEngine;
use crate::dispatch::{InvocationContext, ReadySignal};
use wasmflare_common::DispatchError;

/// State reachable from host functions during one invocation.
#[derive(Debug)]
pub struct InvocationState {
    /// The invocation this store belongs to.
    pub ctx: InvocationContext,

    /// Readiness signal, taken by the first `workers.ready` call.
    ready: Option<ReadySignal>,
}

impl InvocationState {
    /// Create state for one invocation.
    pub fn new(ctx: InvocationContext, ready: ReadySignal) -> Self {
        Self {
            ctx,
            ready: Some(ready),
        }
    }

    /// Fire the readiness signal. Later calls do nothing.
    pub fn signal_ready(&mut self) -> bool {
        match self.ready.take() {
            Some(signal) => {
                signal.signal();
                true
            }
            None => false,
        }
    }

    /// Drop the readiness signal if it was never fired.
    ///
    /// Returns `true` if a pending signal was abandoned.
    pub fn abandon_ready(&mut self) -> bool {
        self.ready.take().is_some()
    }
}

/// Create a store for one invocation, with fuel set if metering is enabled.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    ctx: InvocationContext,
    ready: ReadySignal,
) -> Result<Store<InvocationState>, DispatchError> {
    let mut store = Store::new(engine.inner(), InvocationState::new(ctx, ready));

    if engine.config().fuel_metering {
        store
            .set_fuel(engine.config().max_fuel)
            .map_err(|e| DispatchError::instantiation_failed(format!("Failed to set fuel: {e}")))?;
    }

    Ok(store)
}

/// Fuel consumed since the store was created with `initial_fuel`.
pub fn fuel_consumed(initial_fuel: u64, store: &Store<InvocationState>) -> u64 {
    let remaining = store.get_fuel().unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
