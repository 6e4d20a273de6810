// src/invoker.rs
//
// Entry-point invoker (script mode only).
//
// Script compilations synthesize an entry point under a conventional name,
// but some backends emit it only under a qualified name recoverable from
// their compilation metadata. The lookup is therefore an explicit two-step
// strategy rather than ad hoc fallback handling:
//
//   TryConventional -> TryFallback -> NotFound
//
// NotFound is fatal: it means the backend integration is malformed, not
// that the user's source is wrong.

use tracing::{debug, error};

use crate::error::InvokeError;
use crate::loader::{EntryPointResult, LoadedModule};

/// Conventional name of the synthesized script entry point.
pub const CONVENTIONAL_ENTRY: &str = "__script_main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    TryConventional,
    TryFallback,
    NotFound,
}

/// Locate the entry point of a script module, trying the conventional name
/// first and the backend-reported qualified name second.
fn locate_entry<'a>(
    module: &dyn LoadedModule,
    fallback: Option<&'a str>,
) -> Result<&'a str, InvokeError> {
    let mut state = Lookup::TryConventional;
    loop {
        match state {
            Lookup::TryConventional => {
                if module.has_entry_point(CONVENTIONAL_ENTRY) {
                    return Ok(CONVENTIONAL_ENTRY);
                }
                state = Lookup::TryFallback;
            }
            Lookup::TryFallback => {
                if let Some(name) = fallback {
                    if module.has_entry_point(name) {
                        debug!(module = module.name(), entry = name, "conventional entry absent, using fallback name");
                        return Ok(name);
                    }
                }
                state = Lookup::NotFound;
            }
            Lookup::NotFound => {
                error!(module = module.name(), "no entry point found by either lookup path");
                return Err(InvokeError::EntryPointNotFound {
                    module: module.name().to_string(),
                });
            }
        }
    }
}

/// Invoke a loaded script module's entry point and await its result.
///
/// `fallback` is the qualified entry-point name from the backend's
/// compilation metadata, when it synthesized one. Exceptions raised by the
/// executed code propagate unwrapped.
pub async fn invoke_entry_point(
    module: &dyn LoadedModule,
    fallback: Option<&str>,
) -> Result<EntryPointResult, InvokeError> {
    let entry = locate_entry(module, fallback)?;
    module.invoke(entry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Module exposing a fixed set of entry names.
    #[derive(Debug)]
    struct FakeModule {
        entries: Vec<&'static str>,
    }

    #[async_trait]
    impl LoadedModule for FakeModule {
        fn name(&self) -> &str {
            "fake"
        }

        fn has_entry_point(&self, entry: &str) -> bool {
            self.entries.contains(&entry)
        }

        async fn invoke(&self, entry: &str) -> Result<EntryPointResult, InvokeError> {
            Ok(json!({ "invoked": entry }))
        }
    }

    #[tokio::test]
    async fn conventional_entry_wins_when_present() {
        let module = FakeModule {
            entries: vec![CONVENTIONAL_ENTRY, "m::__script_main"],
        };
        let result = invoke_entry_point(&module, Some("m::__script_main"))
            .await
            .unwrap();
        assert_eq!(result["invoked"], CONVENTIONAL_ENTRY);
    }

    #[tokio::test]
    async fn fallback_name_is_used_when_conventional_is_absent() {
        let module = FakeModule {
            entries: vec!["m::__script_main"],
        };
        let result = invoke_entry_point(&module, Some("m::__script_main"))
            .await
            .unwrap();
        assert_eq!(result["invoked"], "m::__script_main");
    }

    #[tokio::test]
    async fn missing_entry_point_is_fatal() {
        let module = FakeModule { entries: vec![] };
        let err = invoke_entry_point(&module, Some("m::__script_main"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::EntryPointNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_entry_point_without_fallback_is_fatal() {
        let module = FakeModule { entries: vec![] };
        let err = invoke_entry_point(&module, None).await.unwrap_err();
        assert!(matches!(err, InvokeError::EntryPointNotFound { .. }));
    }
}
