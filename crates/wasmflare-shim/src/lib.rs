//! Worker script generation for wasmflare.
//!
//! The deployable script bridges platform triggers to a compiled module. It
//! is three text blocks joined in a fixed order:
//! 1. the compiler's host runtime shim ([`HostShimSource`])
//! 2. the runtime adapter (module import, socket primitive, context object)
//! 3. the dispatch template (entry points, single-flight load, readiness wait)
//!
//! See [`templates`] for the symbols each block expects from the others.

pub mod generator;
pub mod host_shim;
pub mod templates;

pub use generator::{GeneratedShim, ShimGenerator, generate_pages_script};
pub use host_shim::{FileHostShim, HostShimSource, StaticHostShim};
