//! Script blocks.
//!
//! The generated script is three blocks concatenated in order. Nothing
//! checks the symbols one block expects from another when the script is
//! generated; a broken contract shows up when the platform loads it.
//!
//! | Block | Defines | Expects from earlier blocks |
//! |---|---|---|
//! | host runtime shim | `Go` (with `importObject` and `run(instance, ctx)`) | |
//! | runtime adapter | `loadModule()`, `createRuntimeContext({ env, ctx, binding })`; imports `connect` and the module | |
//! | dispatch template | entry points `fetch`, `scheduled`, `queue`, `onRequest` (default export) | `Go`, `loadModule`, `createRuntimeContext` |
//!
//! The module itself imports `workers.ready` and, before calling it, fills
//! the `binding` object with `handleRequest`, `runScheduler` and
//! `handleQueueMessageBatch`.

/// Placeholder replaced by the module reference in [`RUNTIME_ADAPTER`].
const MODULE_PLACEHOLDER: &str = "__WASMFLARE_MODULE__";

/// Symbols the host runtime shim must define.
pub const HOST_SHIM_EXPORTS: &[&str] = &["Go"];

/// Symbols the runtime adapter defines for the dispatch template.
pub const ADAPTER_EXPORTS: &[&str] = &["loadModule", "createRuntimeContext"];

/// Binds the module reference, the platform socket primitive and the
/// per-invocation `env`/`ctx`/`binding` triple.
const RUNTIME_ADAPTER: &str = r#"// Runtime adapter
import { connect } from "cloudflare:sockets";
import mod from "__WASMFLARE_MODULE__";

async function loadModule() {
  return mod;
}

function createRuntimeContext({ env, ctx, binding }) {
  return {
    env,
    ctx,
    connect,
    binding,
  };
}"#;

/// Trigger dispatch.
///
/// The module is loaded once per isolate. The first caller stores the load
/// promise before awaiting it, so concurrent callers share one load; a
/// failed load clears the slot and the next invocation tries again.
/// Every invocation gets its own instance and waits for its `ready` call
/// before touching `binding`.
pub const DISPATCH_TEMPLATE: &str = r#"// Trigger dispatch
let modPromise;

globalThis.tryCatch = (fn) => {
  try {
    return {
      result: fn(),
    };
  } catch (e) {
    return {
      error: e,
    };
  }
};

function loadModuleOnce() {
  if (modPromise === undefined) {
    modPromise = loadModule().catch((err) => {
      modPromise = undefined;
      throw err;
    });
  }
  return modPromise;
}

async function run(ctx) {
  const mod = await loadModuleOnce();
  const go = new Go();

  let ready;
  const readyPromise = new Promise((resolve) => {
    ready = resolve;
  });
  const instance = new WebAssembly.Instance(mod, {
    ...go.importObject,
    workers: {
      ready: () => {
        ready();
      },
    },
  });
  go.run(instance, ctx);
  await readyPromise;
}

async function fetch(req, env, ctx) {
  const binding = {};
  await run(createRuntimeContext({ env, ctx, binding }));
  return binding.handleRequest(req);
}

async function scheduled(event, env, ctx) {
  const binding = {};
  await run(createRuntimeContext({ env, ctx, binding }));
  return binding.runScheduler(event);
}

async function queue(batch, env, ctx) {
  const binding = {};
  await run(createRuntimeContext({ env, ctx, binding }));
  return binding.handleQueueMessageBatch(batch);
}

// Pages functions entry point
async function onRequest(ctx) {
  const binding = {};
  const { request, env } = ctx;
  await run(createRuntimeContext({ env, ctx, binding }));
  return binding.handleRequest(request);
}

export default {
  fetch,
  scheduled,
  queue,
  onRequest,
};"#;

/// Runtime adapter block importing the given module reference.
///
/// The reference is inserted verbatim.
pub fn runtime_adapter(module_ref: &str) -> String {
    RUNTIME_ADAPTER.replace(MODULE_PLACEHOLDER, module_ref)
}
