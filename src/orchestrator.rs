// src/orchestrator.rs
//
// Compilation orchestrator: assembles source text, resolved references and
// options into a backend request, classifies the backend's diagnostics, and
// drives load + invoke for script inputs.
//
// One logical pipeline per request. The reference cache is the only state
// shared between requests running concurrently against the same instance;
// it is injected here with an explicit lifetime rather than living as
// ambient process-wide state.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::backend::{
    CompilationRequest, CompilerBackend, Emitted, Optimize, SourceKind,
};
use crate::cache::{ModuleReference, ReferenceCache};
use crate::error::{CompileError, PipelineError};
use crate::fetcher::ModuleFetcher;
use crate::invoker;
use crate::loader::{EntryPointResult, LoadedModule, ModuleHost};
use crate::resolver;

/// What to do when a module cannot be fetched.
///
/// The default is `Soft`: the module is skipped and the backend's own
/// diagnostics are authoritative if its symbols were actually needed.
/// `Strict` turns the first fetch failure into a hard compilation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    #[default]
    Soft,
    Strict,
}

/// Construction-time options for an orchestrator instance.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Modules the host application itself was built against. The backend's
    /// baseline module is always added on top of these.
    pub host_dependencies: Vec<String>,
    pub fetch_policy: FetchPolicy,
}

/// Result of `compile_and_maybe_run`: either a built module (regular kind)
/// or a loaded-and-invoked script with its entry point's result.
pub enum RunOutcome {
    Built(Emitted),
    Ran {
        module: Arc<dyn LoadedModule>,
        result: EntryPointResult,
    },
}

pub struct Orchestrator {
    backend: Arc<dyn CompilerBackend>,
    fetcher: Arc<dyn ModuleFetcher>,
    host: Arc<dyn ModuleHost>,
    cache: ReferenceCache,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn CompilerBackend>,
        fetcher: Arc<dyn ModuleFetcher>,
        host: Arc<dyn ModuleHost>,
        options: OrchestratorOptions,
    ) -> Self {
        Orchestrator {
            backend,
            fetcher,
            host,
            cache: ReferenceCache::new(),
            options,
        }
    }

    /// The shared reference cache (one per orchestrator instance).
    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Resolve the reference set for one request. Fetches run concurrently;
    /// the resulting set is commutative so completion order is irrelevant.
    /// Soft fetch failures shrink the set; under `Strict` the first failure
    /// aborts.
    async fn resolve_references(&self) -> Result<Vec<ModuleReference>, CompileError> {
        let names = resolver::resolve(
            self.backend.baseline_module(),
            &self.options.host_dependencies,
        );

        let lookups = names
            .iter()
            .map(|name| self.cache.get_or_fetch(name, self.fetcher.as_ref()));

        let mut references = Vec::with_capacity(names.len());
        for outcome in join_all(lookups).await {
            match outcome {
                Ok(reference) => references.push(reference),
                Err(err) => match self.options.fetch_policy {
                    FetchPolicy::Soft => {
                        warn!(module = err.module(), %err, "skipping unfetchable module");
                    }
                    FetchPolicy::Strict => {
                        return Err(CompileError::MissingReference(err));
                    }
                },
            }
        }
        Ok(references)
    }

    /// Compile source text into a binary image.
    ///
    /// Returns the emitted image on success. Any error-severity diagnostic
    /// (or warning escalated to error) fails the request with the full
    /// ordered diagnostic list; no retry is performed.
    pub async fn compile(
        &self,
        source: &str,
        module_name: Option<String>,
        optimize: Optimize,
        kind: SourceKind,
    ) -> Result<Emitted, CompileError> {
        let references = self.resolve_references().await?;
        let request = CompilationRequest::new(source, module_name, references, optimize, kind)?;

        let emission = self.backend.compile(&request);

        let errors: Vec<_> = emission
            .diagnostics
            .iter()
            .filter(|d| d.severity.blocks_emission())
            .cloned()
            .collect();
        if !errors.is_empty() {
            return Err(CompileError::Failed(errors));
        }

        match emission.image {
            Some(image) => {
                info!(
                    module = request.module_name(),
                    bytes = image.len(),
                    "emission succeeded"
                );
                Ok(Emitted {
                    module_name: request.module_name().to_string(),
                    image,
                    entry_point: emission.entry_point,
                })
            }
            // A backend that emits nothing without reporting an error is
            // misbehaving; treat it as a failure with whatever it did say.
            None => Err(CompileError::Failed(emission.diagnostics)),
        }
    }

    /// The pipeline's public surface: compile, and for script inputs also
    /// load the emitted module and run its synthesized entry point.
    pub async fn compile_and_maybe_run(
        &self,
        source: &str,
        module_name: Option<String>,
        optimize: Optimize,
        kind: SourceKind,
    ) -> Result<RunOutcome, PipelineError> {
        let emitted = self.compile(source, module_name, optimize, kind).await?;

        if kind != SourceKind::Script {
            return Ok(RunOutcome::Built(emitted));
        }

        let module = self.host.load(&emitted.image, &emitted.module_name)?;
        let result = invoker::invoke_entry_point(module.as_ref(), emitted.entry_point.as_deref()).await?;
        Ok(RunOutcome::Ran { module, result })
    }
}
