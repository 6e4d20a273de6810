// src/config.rs
//
// Environment-based configuration for the scriptloader CLI/runtime.
//
// Loads JSON from config/config.<env>.json where env = SCRIPTLOADER_ENV
// or "dev". Example config/config.dev.json:
//
// {
//   "endpoint": {
//     "base_url": "http://localhost:5000",
//     "path_template": "_framework/{module}.dll"
//   },
//   "fetch": { "policy": "soft" },
//   "compile": { "release": true },
//   "host_dependencies": ["util", "net"]
// }
//
// Programmatic construction via OrchestratorOptions always takes
// precedence over this file; only the CLI reads it.

use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::{env, fs, path::Path, sync::Mutex};
use tracing::warn;

use crate::orchestrator::FetchPolicy;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EndpointConfigFile {
    /// Base URL of the byte-source endpoint serving module bytes.
    pub base_url: Option<String>,
    /// Relative path template; `{module}` is replaced by the module name.
    pub path_template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FetchConfigFile {
    /// "soft" (default): an unfetchable module is skipped and the backend's
    /// diagnostics decide whether that mattered. "strict": abort instead.
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CompileConfigFile {
    pub release: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    pub endpoint: Option<EndpointConfigFile>,
    pub fetch: Option<FetchConfigFile>,
    pub compile: Option<CompileConfigFile>,
    /// Modules the host application was built against.
    pub host_dependencies: Option<Vec<String>>,
    /// Arbitrary key/value config.
    pub values: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Default)]
struct RuntimeConfig {
    file: FileConfig,
    env_name: String,
}

static RUNTIME_CONFIG: OnceCell<Mutex<RuntimeConfig>> = OnceCell::new();

fn runtime() -> &'static Mutex<RuntimeConfig> {
    RUNTIME_CONFIG.get_or_init(|| Mutex::new(RuntimeConfig::default()))
}

/// Initialize configuration from disk (idempotent). Missing or malformed
/// files fall back to defaults.
pub fn init() {
    let env_name = env::var("SCRIPTLOADER_ENV").unwrap_or_else(|_| "dev".to_string());
    let file_name = format!("config.{}.json", env_name);
    let path = Path::new("config").join(file_name);

    let file_cfg: FileConfig = match fs::read_to_string(&path) {
        Ok(text) => match serde_json::from_str::<FileConfig>(&text) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to parse config, using defaults");
                FileConfig::default()
            }
        },
        Err(err) => {
            if path.exists() {
                warn!(path = %path.display(), %err, "failed to read config, using defaults");
            }
            FileConfig::default()
        }
    };

    let mut guard = runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned");
    guard.env_name = env_name;
    guard.file = file_cfg;
}

/// Current logical environment name (e.g. "dev", "prod").
pub fn env_name() -> String {
    runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned")
        .env_name
        .clone()
}

/// Endpoint section, if present.
pub fn endpoint_section() -> Option<EndpointConfigFile> {
    runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned")
        .file
        .endpoint
        .clone()
}

/// Fetch-failure policy from the config file; defaults to soft.
pub fn fetch_policy() -> FetchPolicy {
    let policy = runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned")
        .file
        .fetch
        .as_ref()
        .and_then(|f| f.policy.clone());
    match policy.as_deref() {
        Some("strict") => FetchPolicy::Strict,
        Some("soft") | None => FetchPolicy::Soft,
        Some(other) => {
            warn!(policy = other, "unknown fetch policy, defaulting to soft");
            FetchPolicy::Soft
        }
    }
}

/// Whether the CLI compiles in release mode by default.
pub fn compile_release() -> bool {
    runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned")
        .file
        .compile
        .as_ref()
        .and_then(|c| c.release)
        .unwrap_or(true)
}

/// Host dependency list from the config file.
pub fn host_dependencies() -> Vec<String> {
    runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned")
        .file
        .host_dependencies
        .clone()
        .unwrap_or_default()
}

/// Get an arbitrary configuration value, if defined.
pub fn get_value(key: &str) -> Option<serde_json::Value> {
    runtime()
        .lock()
        .expect("scriptloader runtime config mutex poisoned")
        .file
        .values
        .as_ref()
        .and_then(|v| v.get(key))
        .cloned()
}
