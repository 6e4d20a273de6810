// src/resolver.rs
//
// Reference resolver: turns the host application's static dependency list
// into the ordered set of module names the compiler backend must see.
//
// Pure function of its input. The baseline core-runtime module is always
// included first, even when the host's own list omits it, because generated
// and script code routinely depends on core primitives the host never
// enumerates explicitly.

use std::collections::HashSet;
use std::fmt;

/// Identifier of a binary module (a library name without extension).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        ModuleName(s.to_string())
    }
}

/// Resolve the set of module names to fetch for a compilation request.
///
/// `baseline` is the core runtime module of the backend's language; it is
/// prepended unconditionally. Duplicate names are dropped, preserving
/// first-seen order so downstream fetch work is not repeated.
pub fn resolve(baseline: &str, host_dependencies: &[String]) -> Vec<ModuleName> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(host_dependencies.len() + 1);

    seen.insert(baseline.to_string());
    out.push(ModuleName::new(baseline));

    for dep in host_dependencies {
        if seen.insert(dep.clone()) {
            out.push(ModuleName::new(dep.clone()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_always_comes_first() {
        let names = resolve("calc.core", &["util".to_string(), "net".to_string()]);
        assert_eq!(names[0], ModuleName::new("calc.core"));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn duplicates_are_dropped_preserving_first_seen_order() {
        let deps = vec![
            "util".to_string(),
            "net".to_string(),
            "util".to_string(),
            "calc.core".to_string(),
        ];
        let names = resolve("calc.core", &deps);
        let flat: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(flat, vec!["calc.core", "util", "net"]);
    }

    #[test]
    fn empty_dependency_list_still_yields_baseline() {
        let names = resolve("calc.core", &[]);
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].as_str(), "calc.core");
    }
}
