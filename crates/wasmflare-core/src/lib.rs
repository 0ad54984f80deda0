//! Trigger dispatch for wasmflare.
//!
//! This crate provides the dispatcher that sits between platform triggers
//! and a compiled module:
//! - [`Dispatcher`]: Load-once module slot, per-invocation instances,
//!   readiness handshake, trigger forwarding
//! - [`ModuleHost`]: The seam a runtime plugs into
//! - [`WasmHost`]: A Wasmtime host running core modules locally
//! - [`WasmEngine`], [`CompiledModule`]: Shared engine and compiled module
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Dispatcher                          │
//! │  ModuleSlot: Unloaded → Loading → Ready (single-flight) │
//! └─────────────────────────────────────────────────────────┘
//!                            │ once
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CompiledModule                        │
//! │  (shared by every instance)                             │
//! └─────────────────────────────────────────────────────────┘
//!                            │ per invocation
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          Store<InvocationState> + Instance              │
//! │  - run loop, then wait for workers.ready                │
//! │  - forward trigger to its binding                       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod dispatch;
pub mod engine;
pub mod instance;
pub mod module;
pub mod store;

pub use dispatch::{
    Dispatcher, InvocationContext, LoadState, ModuleHost, ModuleSlot, ReadySignal, ReadyWaiter,
    Trigger, readiness,
};
pub use engine::WasmEngine;
pub use instance::{WasmHost, WasmInstance, local_dispatcher};
pub use module::{CompiledModule, ModuleSource};
pub use store::InvocationState;
