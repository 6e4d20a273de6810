// src/backend.rs
//
// The compiler backend contract. The backend is an opaque service from the
// pipeline's point of view: it consumes source text, a source kind, a list
// of module references and an optimization mode, and produces either a
// binary image or an ordered diagnostic list. Parsing, type checking and
// code generation are entirely its business.
//
// The built-in reference backend lives in src/calc/.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::cache::ModuleReference;
use crate::error::CompileError;

/// Optimization mode requested for emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimize {
    Debug,
    #[default]
    Release,
}

/// Whether the source text is a complete compilation unit or a sequence of
/// top-level statements that the backend wraps into a synthesized entry
/// point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    Regular,
    Script,
}

/// How severe a diagnostic is. Only `Error` and `WarningAsError` block
/// emission; the rest are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    WarningAsError,
    Warning,
    Info,
}

impl Severity {
    pub fn blocks_emission(self) -> bool {
        matches!(self, Severity::Error | Severity::WarningAsError)
    }
}

/// A structured compiler message: location, backend-defined code, severity
/// and human-readable text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: u32, column: u32, code: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            line,
            column,
            code: code.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line: {} Col: {} Code: {} Message: {}",
            self.line, self.column, self.code, self.message
        )
    }
}

/// An immutable compilation request: source text, module name, references,
/// optimization mode and source kind.
pub struct CompilationRequest {
    source: String,
    module_name: String,
    references: Vec<ModuleReference>,
    optimize: Optimize,
    kind: SourceKind,
}

impl CompilationRequest {
    /// Build a request. The module name defaults to a generated unique name
    /// when none is supplied; empty source text is rejected up front.
    pub fn new(
        source: impl Into<String>,
        module_name: Option<String>,
        references: Vec<ModuleReference>,
        optimize: Optimize,
        kind: SourceKind,
    ) -> Result<Self, CompileError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(CompileError::EmptySource);
        }
        let module_name = match module_name {
            Some(name) if !name.is_empty() => name,
            _ => generate_module_name(),
        };
        Ok(CompilationRequest {
            source,
            module_name,
            references,
            optimize,
            kind,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn references(&self) -> &[ModuleReference] {
        &self.references
    }

    pub fn optimize(&self) -> Optimize {
        self.optimize
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }
}

/// A successfully emitted module: the binary image plus the metadata the
/// invoker needs to find the synthesized entry point by name if the
/// conventional lookup fails.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub module_name: String,
    pub image: Vec<u8>,
    /// Qualified entry-point name from the backend's compilation metadata,
    /// if the compilation synthesized one.
    pub entry_point: Option<String>,
}

/// Raw result of one backend call: an image (when emission succeeded) plus
/// every diagnostic the backend produced, in source order. Classification
/// into success/failure is the orchestrator's job.
pub struct Emission {
    pub image: Option<Vec<u8>>,
    pub entry_point: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The external compiler service. One call per request; the pipeline never
/// retries a backend failure.
pub trait CompilerBackend: Send + Sync {
    /// Name of the language's core runtime module. Always resolved and
    /// offered as a reference even when the host's dependency list omits it.
    fn baseline_module(&self) -> &str;

    fn compile(&self, request: &CompilationRequest) -> Emission;
}

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique module name for requests that did not supply
/// one, so repeated loads never collide.
fn generate_module_name() -> String {
    let id = NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed);
    format!("script_{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_rejected() {
        let result = CompilationRequest::new("  \n ", None, Vec::new(), Optimize::Debug, SourceKind::Script);
        assert!(matches!(result, Err(CompileError::EmptySource)));
    }

    #[test]
    fn generated_module_names_are_unique() {
        let a = CompilationRequest::new("return 1;", None, Vec::new(), Optimize::Debug, SourceKind::Script)
            .unwrap();
        let b = CompilationRequest::new("return 1;", None, Vec::new(), Optimize::Debug, SourceKind::Script)
            .unwrap();
        assert_ne!(a.module_name(), b.module_name());
    }

    #[test]
    fn supplied_module_name_is_kept() {
        let request = CompilationRequest::new(
            "return 1;",
            Some("my_module".to_string()),
            Vec::new(),
            Optimize::Release,
            SourceKind::Script,
        )
        .unwrap();
        assert_eq!(request.module_name(), "my_module");
    }

    #[test]
    fn only_errors_block_emission() {
        assert!(Severity::Error.blocks_emission());
        assert!(Severity::WarningAsError.blocks_emission());
        assert!(!Severity::Warning.blocks_emission());
        assert!(!Severity::Info.blocks_emission());
    }

    #[test]
    fn diagnostic_display_matches_reporting_format() {
        let diag = Diagnostic::error(3, 7, "CALC0001", "unexpected token");
        assert_eq!(
            diag.to_string(),
            "Line: 3 Col: 7 Code: CALC0001 Message: unexpected token"
        );
    }
}
