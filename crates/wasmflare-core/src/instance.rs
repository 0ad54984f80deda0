//! Wasmtime-backed [`ModuleHost`].
//!
//! [`WasmHost`] runs a core module under the dispatcher's contract. The
//! module must follow this ABI:
//!
//! - import `workers.ready: () -> ()`, called once bindings are usable
//! - export `memory` and `alloc(len: i32) -> i32`
//! - optionally export `_start`, the run loop started on instantiation
//! - export a binding per trigger kind (`handleRequest`, `runScheduler`,
//!   `handleQueueMessageBatch`) as `(ptr: i32, len: i32) -> i64`, returning
//!   `(ptr << 32) | len` of the response bytes
//!
//! A core module cannot signal readiness after its run loop returns, so a
//! run loop that returns without calling `ready` abandons the invocation.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use wasmtime::{Caller, Instance, Linker, Memory, Store, Trap};

use crate::dispatch::{Dispatcher, InvocationContext, ModuleHost, ReadySignal, Trigger};
use crate::module::{CompiledModule, ModuleSource};
use crate::store::{InvocationState, create_store, fuel_consumed};
use crate::WasmEngine;
use wasmflare_common::{DispatchError, LocalRuntimeConfig};

/// Run loop export.
pub const START_EXPORT: &str = "_start";

/// Allocator export used to place the trigger payload.
pub const ALLOC_EXPORT: &str = "alloc";

/// Linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// A started instance and its store.
pub struct WasmInstance {
    store: Store<InvocationState>,
    instance: Instance,
}

impl WasmInstance {
    /// Invocation this instance was created for.
    pub fn context(&self) -> &InvocationContext {
        &self.store.data().ctx
    }
}

impl std::fmt::Debug for WasmInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmInstance")
            .field("invocation_id", &self.context().invocation_id)
            .finish_non_exhaustive()
    }
}

/// Runs compiled modules locally, one fresh instance per invocation.
pub struct WasmHost {
    engine: WasmEngine,
    linker: Linker<InvocationState>,
    source: ModuleSource,
}

impl WasmHost {
    /// Create a host for the module at `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or the host imports cannot be set up.
    pub fn new(config: &LocalRuntimeConfig, source: ModuleSource) -> Result<Self, DispatchError> {
        let engine = WasmEngine::new(config)?;
        let mut linker = Linker::new(engine.inner());

        linker
            .func_wrap("workers", "ready", |mut caller: Caller<'_, InvocationState>| {
                if caller.data_mut().signal_ready() {
                    debug!(invocation_id = %caller.data().ctx.invocation_id, "Instance signalled ready");
                }
            })
            .map_err(|e| DispatchError::load_failed(format!("Failed to link workers.ready: {e}")))?;

        Ok(Self {
            engine,
            linker,
            source,
        })
    }

    /// The shared engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }
}

impl std::fmt::Debug for WasmHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmHost")
            .field("engine", &self.engine)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModuleHost for WasmHost {
    type Module = CompiledModule;
    type Instance = WasmInstance;

    async fn load(&self) -> Result<CompiledModule, DispatchError> {
        self.source.compile(self.engine.inner()).await
    }

    #[instrument(skip_all, fields(invocation_id = %ctx.invocation_id))]
    async fn instantiate(
        &self,
        module: &CompiledModule,
        ctx: &InvocationContext,
        ready: ReadySignal,
    ) -> Result<WasmInstance, DispatchError> {
        let mut store = create_store(&self.engine, ctx.clone(), ready)?;

        let instance = self
            .linker
            .instantiate_async(&mut store, module.inner())
            .await
            .map_err(|e| DispatchError::instantiation_failed(format!("Instantiation failed: {e}")))?;

        if let Ok(start) = instance.get_typed_func::<(), ()>(&mut store, START_EXPORT) {
            let initial_fuel = store.get_fuel().unwrap_or(0);
            start.call_async(&mut store, ()).await.map_err(|e| {
                DispatchError::instantiation_failed(format!("Run loop failed: {}", describe_trap(&e)))
            })?;
            debug!(fuel_consumed = fuel_consumed(initial_fuel, &store), "Run loop returned");
        }

        if store.data_mut().abandon_ready() {
            warn!("Run loop returned without signalling ready");
        }

        Ok(WasmInstance { store, instance })
    }

    #[instrument(skip_all, fields(invocation_id = %instance.context().invocation_id, binding = trigger.kind.binding()))]
    async fn forward(
        &self,
        instance: &mut WasmInstance,
        trigger: &Trigger,
    ) -> Result<Vec<u8>, DispatchError> {
        let name = trigger.kind.binding();
        let WasmInstance { store, instance } = instance;
        let start = Instant::now();

        let binding = instance
            .get_typed_func::<(i32, i32), i64>(&mut *store, name)
            .map_err(|_| DispatchError::MissingBinding {
                name: name.to_string(),
            })?;
        let memory = instance
            .get_memory(&mut *store, MEMORY_EXPORT)
            .ok_or_else(|| DispatchError::trap(name, "module exports no memory"))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut *store, ALLOC_EXPORT)
            .map_err(|_| DispatchError::trap(name, "module exports no alloc(i32) -> i32"))?;

        let len = i32::try_from(trigger.payload.len())
            .map_err(|_| DispatchError::trap(name, "payload larger than guest address space"))?;
        let ptr = alloc
            .call_async(&mut *store, len)
            .await
            .map_err(|e| DispatchError::trap(name, format!("alloc failed: {}", describe_trap(&e))))?;

        write_guest(&memory, &mut *store, ptr, &trigger.payload)
            .map_err(|reason| DispatchError::trap(name, reason))?;

        let packed = binding
            .call_async(&mut *store, (ptr, len))
            .await
            .map_err(|e| DispatchError::trap(name, describe_trap(&e)))?;

        let (out_ptr, out_len) = unpack(packed);
        let memory_size = memory.data_size(&*store);
        if out_ptr.checked_add(out_len).is_none_or(|end| end > memory_size) {
            return Err(DispatchError::trap(
                name,
                format!("response out of bounds: {out_len} bytes at {out_ptr}, memory is {memory_size} bytes"),
            ));
        }
        let mut response = vec![0; out_len];
        memory
            .read(&*store, out_ptr, &mut response)
            .map_err(|e| DispatchError::trap(name, format!("response out of bounds: {e}")))?;

        debug!(
            duration_us = start.elapsed().as_micros(),
            response_size = response.len(),
            "Binding returned"
        );

        Ok(response)
    }
}

/// Create a dispatcher running `source` on a local Wasmtime host.
///
/// # Errors
///
/// Returns an error if the host cannot be set up.
pub fn local_dispatcher(
    config: &LocalRuntimeConfig,
    source: ModuleSource,
) -> Result<Dispatcher<WasmHost>, DispatchError> {
    let host = WasmHost::new(config, source)?;
    Ok(Dispatcher::new(host).with_ready_timeout(config.ready_timeout()))
}

fn write_guest(
    memory: &Memory,
    store: &mut Store<InvocationState>,
    ptr: i32,
    bytes: &[u8],
) -> Result<(), String> {
    let offset = usize::try_from(ptr).map_err(|_| format!("alloc returned negative pointer {ptr}"))?;
    memory
        .write(store, offset, bytes)
        .map_err(|e| format!("payload out of bounds: {e}"))
}

/// Split a packed `(ptr << 32) | len` result.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn unpack(packed: i64) -> (usize, usize) {
    let packed = packed as u64;
    ((packed >> 32) as usize, (packed & 0xffff_ffff) as usize)
}

/// Human-readable trap description.
fn describe_trap(error: &wasmtime::Error) -> String {
    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => "fuel exhausted".to_string(),
        Some(trap) => format!("{error} ({trap:?})"),
        None => error.to_string(),
    }
}
