// src/lib.rs
//
// Library root for scriptloader: a runtime compilation and
// module-resolution pipeline. Source text goes in; the host's binary
// dependencies are fetched over the network and cached as compiler
// references; an external backend emits a binary image; the image is
// loaded into the running process and, for script inputs, its synthesized
// entry point is invoked.

pub mod backend;
pub mod cache;
pub mod calc;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod invoker;
pub mod loader;
pub mod orchestrator;
pub mod resolver;

pub use backend::{CompilerBackend, Diagnostic, Emitted, Optimize, Severity, SourceKind};
pub use cache::{ModuleReference, ReferenceCache};
pub use error::{CompileError, FetchError, InvokeError, LoadError, PipelineError};
pub use fetcher::{HttpModuleFetcher, ModuleFetcher, OfflineFetcher};
pub use loader::{EntryPointResult, LoadedModule, ModuleHost};
pub use orchestrator::{FetchPolicy, Orchestrator, OrchestratorOptions, RunOutcome};
pub use resolver::ModuleName;
