use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::{error::Error, fs, process};

use scriptloader::calc::host::CalcHost;
use scriptloader::calc::CalcBackend;
use scriptloader::{
    config, HttpModuleFetcher, ModuleFetcher, OfflineFetcher, Optimize, Orchestrator,
    OrchestratorOptions, PipelineError, RunOutcome, SourceKind,
};

/// scriptloader CLI
#[derive(Parser)]
#[command(name = "scriptloader")]
#[command(about = "Compile and run source text through the runtime pipeline", long_about = None)]
struct Cli {
    /// Path to the source file
    #[arg(global = true, short, long, default_value = "app.calc")]
    file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile only and print diagnostics (exit 1 on failure)
    Check {
        /// Treat the source as a script (top-level statements)
        #[arg(long)]
        script: bool,
    },

    /// Compile and write the emitted image to a file
    Build {
        #[arg(long)]
        script: bool,

        /// Output path for the emitted image
        #[arg(short, long, default_value = "out.image.json")]
        out: String,
    },

    /// Compile, load and run a script, printing its result
    Run,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scriptloader=info")),
        )
        .init();

    // Initialize environment-specific configuration (config/config.<env>.json).
    config::init();

    let cli = Cli::parse();
    let source = fs::read_to_string(&cli.file)
        .map_err(|e| format!("Failed to read {}: {}", &cli.file, e))?;

    let orchestrator = build_orchestrator();
    let optimize = if config::compile_release() {
        Optimize::Release
    } else {
        Optimize::Debug
    };

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Check { script } => {
            let kind = kind_for(script);
            match runtime.block_on(orchestrator.compile(&source, None, optimize, kind)) {
                Ok(emitted) => {
                    println!("OK: {} ({} bytes)", &cli.file, emitted.image.len());
                }
                Err(err) => {
                    report_failure(&PipelineError::Compile(err));
                    process::exit(1);
                }
            }
        }

        Commands::Build { script, out } => {
            let kind = kind_for(script);
            match runtime.block_on(orchestrator.compile(&source, None, optimize, kind)) {
                Ok(emitted) => {
                    fs::write(&out, &emitted.image)?;
                    println!("Built {} -> {} ({} bytes)", &cli.file, out, emitted.image.len());
                }
                Err(err) => {
                    report_failure(&PipelineError::Compile(err));
                    process::exit(1);
                }
            }
        }

        Commands::Run => {
            let outcome = runtime.block_on(orchestrator.compile_and_maybe_run(
                &source,
                None,
                optimize,
                SourceKind::Script,
            ));
            match outcome {
                Ok(RunOutcome::Ran { result, .. }) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Ok(RunOutcome::Built(_)) => unreachable!("script kind always runs"),
                Err(err) => {
                    report_failure(&err);
                    process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Wire the pipeline from file configuration: HTTP fetcher when an endpoint
/// is configured, otherwise offline (only inline references are available).
fn build_orchestrator() -> Orchestrator {
    let fetcher: Arc<dyn ModuleFetcher> = match config::endpoint_section() {
        Some(endpoint) => match endpoint.base_url {
            Some(base_url) => {
                let template = endpoint
                    .path_template
                    .unwrap_or_else(|| scriptloader::fetcher::DEFAULT_PATH_TEMPLATE.to_string());
                Arc::new(HttpModuleFetcher::with_template(base_url, template))
            }
            None => Arc::new(OfflineFetcher),
        },
        None => Arc::new(OfflineFetcher),
    };

    Orchestrator::new(
        Arc::new(CalcBackend::new()),
        fetcher,
        Arc::new(CalcHost::new()),
        OrchestratorOptions {
            host_dependencies: config::host_dependencies(),
            fetch_policy: config::fetch_policy(),
        },
    )
}

fn kind_for(script: bool) -> SourceKind {
    if script {
        SourceKind::Script
    } else {
        SourceKind::Regular
    }
}

/// Print a pipeline failure: one line per diagnostic for compilation
/// failures, the plain error chain otherwise.
fn report_failure(err: &PipelineError) {
    match err.diagnostics() {
        Some(diags) => {
            eprintln!("Compilation failed:");
            for diag in diags {
                eprintln!("  {diag}");
            }
        }
        None => eprintln!("error: {err}"),
    }
}
