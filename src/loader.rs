// src/loader.rs
//
// Module loader seam: turns a successfully emitted binary image into a
// live, invocable module inside the running process. This is a thin
// adapter over whatever module-loading facility the host runtime provides;
// the built-in in-memory host lives in src/calc/host.rs.
//
// Loading is expected to succeed whenever emission succeeded (the same
// backend produced both), so a load failure is fatal and surfaced
// verbatim, never retried. There is no unload: a loaded module lives until
// the process ends, and every load installs a fresh, independently
// addressable module even when names collide.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{InvokeError, LoadError};

/// The value a script's entry point produced. The executed code determines
/// its concrete shape, so it stays an opaque dynamic value.
pub type EntryPointResult = Value;

/// Live handle to code resident in the process.
#[async_trait]
pub trait LoadedModule: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Whether an entry point with this (conventional or qualified) name
    /// exists in the module.
    fn has_entry_point(&self, entry: &str) -> bool;

    /// Run the named entry point to completion. Errors raised by the
    /// executed code propagate unmodified as `InvokeError::Execution`.
    async fn invoke(&self, entry: &str) -> Result<EntryPointResult, InvokeError>;
}

/// Process-level facility that installs an in-memory binary image into the
/// executable module set.
pub trait ModuleHost: Send + Sync {
    fn load(&self, image: &[u8], module_name: &str) -> Result<Arc<dyn LoadedModule>, LoadError>;
}
