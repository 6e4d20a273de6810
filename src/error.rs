// src/error.rs
//
// Error taxonomy for the compilation pipeline.
//
// The split follows how each failure is allowed to propagate:
// - FetchError: soft. A module that cannot be fetched is skipped (under the
//   default policy) and at worst resurfaces later as a backend diagnostic.
// - CompileError: recoverable. Carries the backend's full ordered diagnostic
//   list so a caller can show it to whoever authored the source text.
// - LoadError / InvokeError: fatal. These mean the pipeline or backend
//   integration is broken, not the user's source.

use thiserror::Error;

use crate::backend::Diagnostic;

/// A single module could not be retrieved from the byte source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error fetching '{module}': {source}")]
    Http {
        module: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("byte source returned status {status} for '{module}'")]
    Status { module: String, status: u16 },

    #[error("module '{module}' is not present at the byte source")]
    Missing { module: String },
}

impl FetchError {
    /// The module name this failure is about.
    pub fn module(&self) -> &str {
        match self {
            FetchError::Http { module, .. } => module,
            FetchError::Status { module, .. } => module,
            FetchError::Missing { module } => module,
        }
    }
}

/// The backend rejected a compilation request.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("source text is empty")]
    EmptySource,

    #[error("compilation failed with {} error diagnostic(s)", .0.len())]
    Failed(Vec<Diagnostic>),

    /// Only produced under `FetchPolicy::Strict`; the default soft policy
    /// lets the backend's own diagnostics be authoritative instead.
    #[error("required reference could not be fetched")]
    MissingReference(#[source] FetchError),
}

/// The emitted image could not be installed into the process.
///
/// Emission and loading are done by the same backend pair, so this is a
/// defect in that integration and is surfaced verbatim, never retried.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load emitted module '{module}': {reason}")]
    Malformed { module: String, reason: String },
}

/// Entry-point lookup or execution failed (script mode).
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no entry point found in module '{module}' (tried conventional and fallback names)")]
    EntryPointNotFound { module: String },

    /// The executed code itself raised; propagated to the caller unmodified.
    #[error("script execution failed: {0}")]
    Execution(String),
}

/// Umbrella error for callers driving the whole pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl PipelineError {
    /// Structured diagnostics, when this failure is a compilation failure.
    pub fn diagnostics(&self) -> Option<&[Diagnostic]> {
        match self {
            PipelineError::Compile(CompileError::Failed(diags)) => Some(diags),
            _ => None,
        }
    }
}
