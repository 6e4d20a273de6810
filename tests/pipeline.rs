// tests/pipeline.rs
//
// End-to-end pipeline tests over the built-in calc backend and host, with
// an in-memory byte source standing in for the network endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scriptloader::calc::host::CalcHost;
use scriptloader::calc::CalcBackend;
use scriptloader::{
    CompileError, FetchError, FetchPolicy, LoadedModule, ModuleFetcher, ModuleHost, ModuleName,
    Optimize, Orchestrator, OrchestratorOptions, Severity, SourceKind,
};

/// In-memory byte source: serves export tables for known modules, reports
/// everything else missing, and counts underlying fetches.
struct MapFetcher {
    modules: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl MapFetcher {
    fn new(modules: &[(&str, Value)]) -> Self {
        let modules = modules
            .iter()
            .map(|(name, exports)| {
                let bytes = serde_json::to_vec(&json!({ "exports": exports })).unwrap();
                (name.to_string(), bytes)
            })
            .collect();
        MapFetcher {
            modules,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleFetcher for MapFetcher {
    async fn fetch(&self, name: &ModuleName) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modules
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Missing {
                module: name.to_string(),
            })
    }
}

fn orchestrator(fetcher: Arc<MapFetcher>, deps: &[&str], policy: FetchPolicy) -> Orchestrator {
    Orchestrator::new(
        Arc::new(CalcBackend::new()),
        fetcher,
        Arc::new(CalcHost::new()),
        OrchestratorOptions {
            host_dependencies: deps.iter().map(|d| d.to_string()).collect(),
            fetch_policy: policy,
        },
    )
}

fn core_fetcher() -> Arc<MapFetcher> {
    Arc::new(MapFetcher::new(&[("calc.core", json!({ "pi_milli": 3142 }))]))
}

#[tokio::test]
async fn valid_program_against_resolved_references_produces_a_loadable_module() {
    let fetcher = Arc::new(MapFetcher::new(&[
        ("calc.core", json!({})),
        ("util", json!({ "answer": 42 })),
    ]));
    let orch = orchestrator(fetcher, &["util"], FetchPolicy::Soft);

    let emitted = orch
        .compile(
            "fn main() { return answer(); }",
            None,
            Optimize::Debug,
            SourceKind::Regular,
        )
        .await
        .unwrap();

    let host = CalcHost::new();
    let module = host.load(&emitted.image, &emitted.module_name).unwrap();
    assert_eq!(module.name(), emitted.module_name);
}

#[tokio::test]
async fn syntax_error_yields_a_located_diagnostic() {
    let orch = orchestrator(core_fetcher(), &[], FetchPolicy::Soft);
    let err = orch
        .compile("let x = 1;\nlet = ;", None, Optimize::Debug, SourceKind::Script)
        .await
        .unwrap_err();

    let CompileError::Failed(diags) = err else {
        panic!("expected diagnostics");
    };
    assert!(!diags.is_empty());
    assert_eq!(diags[0].line, 2);
    assert!(diags[0].column >= 1);
}

#[tokio::test]
async fn second_compilation_reuses_cached_references() {
    let fetcher = Arc::new(MapFetcher::new(&[
        ("calc.core", json!({})),
        ("util", json!({ "answer": 42 })),
    ]));
    let orch = orchestrator(Arc::clone(&fetcher), &["util"], FetchPolicy::Soft);

    orch.compile("return 1;", None, Optimize::Debug, SourceKind::Script)
        .await
        .unwrap();
    let after_first = fetcher.calls();
    assert_eq!(after_first, 2); // calc.core + util

    orch.compile("return 2;", None, Optimize::Debug, SourceKind::Script)
        .await
        .unwrap();
    assert_eq!(fetcher.calls(), after_first);
}

#[tokio::test]
async fn absent_module_does_not_abort_the_pipeline() {
    // "phantom" is in the host dependency list but the byte source has
    // never heard of it.
    let orch = orchestrator(core_fetcher(), &["phantom"], FetchPolicy::Soft);

    // Compilation proceeds when the missing module's symbols are unused...
    orch.compile("return 1 + 1;", None, Optimize::Debug, SourceKind::Script)
        .await
        .unwrap();

    // ...and fails with a backend diagnostic only when they are needed.
    let err = orch
        .compile(
            "return phantom_export();",
            None,
            Optimize::Debug,
            SourceKind::Script,
        )
        .await
        .unwrap_err();
    let CompileError::Failed(diags) = err else {
        panic!("expected diagnostics");
    };
    assert!(diags[0].message.contains("unresolved function"));
}

#[tokio::test]
async fn strict_policy_turns_fetch_failure_into_hard_error() {
    let orch = orchestrator(core_fetcher(), &["phantom"], FetchPolicy::Strict);
    let err = orch
        .compile("return 1;", None, Optimize::Debug, SourceKind::Script)
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::MissingReference(_)));
}

#[tokio::test]
async fn script_round_trip_compiles_loads_and_runs() {
    let orch = orchestrator(core_fetcher(), &[], FetchPolicy::Soft);
    let outcome = orch
        .compile_and_maybe_run("return 2 + 2;", None, Optimize::Release, SourceKind::Script)
        .await
        .unwrap();

    match outcome {
        scriptloader::RunOutcome::Ran { result, .. } => assert_eq!(result, Value::from(4)),
        scriptloader::RunOutcome::Built(_) => panic!("script kind must run"),
    }
}

#[tokio::test]
async fn regular_kind_builds_without_running() {
    let orch = orchestrator(core_fetcher(), &[], FetchPolicy::Soft);
    let outcome = orch
        .compile_and_maybe_run(
            "fn main() { return 9; }",
            Some("unit".to_string()),
            Optimize::Debug,
            SourceKind::Regular,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, scriptloader::RunOutcome::Built(_)));
}

#[tokio::test]
async fn type_error_reports_error_severity_mismatch() {
    let orch = orchestrator(core_fetcher(), &[], FetchPolicy::Soft);
    let err = orch
        .compile(
            "let x: int = \"not a number\";",
            None,
            Optimize::Debug,
            SourceKind::Script,
        )
        .await
        .unwrap_err();

    let CompileError::Failed(diags) = err else {
        panic!("expected diagnostics");
    };
    let diag = &diags[0];
    assert_eq!(diag.severity, Severity::Error);
    assert!(diag.message.contains("type mismatch"));
    assert_eq!(diag.line, 1);
}

#[tokio::test]
async fn concurrent_requests_share_one_cache_entry_per_module() {
    let fetcher = Arc::new(MapFetcher::new(&[
        ("calc.core", json!({})),
        ("shared.mod", json!({ "seed": 7 })),
    ]));
    let orch = orchestrator(Arc::clone(&fetcher), &["shared.mod"], FetchPolicy::Soft);

    let (a, b) = tokio::join!(
        orch.compile_and_maybe_run("return seed() + 1;", None, Optimize::Debug, SourceKind::Script),
        orch.compile_and_maybe_run("return seed() * 2;", None, Optimize::Debug, SourceKind::Script),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    assert!(orch.cache().contains(&ModuleName::new("shared.mod")).await);
    assert_eq!(orch.cache().len().await, 2); // calc.core + shared.mod, once each
}

#[tokio::test]
async fn baseline_core_module_exports_are_always_available() {
    // The host dependency list is empty, but calc.core is resolved anyway.
    let orch = orchestrator(core_fetcher(), &[], FetchPolicy::Soft);
    let outcome = orch
        .compile_and_maybe_run("return pi_milli();", None, Optimize::Debug, SourceKind::Script)
        .await
        .unwrap();
    match outcome {
        scriptloader::RunOutcome::Ran { result, .. } => assert_eq!(result, Value::from(3142)),
        _ => panic!("script kind must run"),
    }
}
