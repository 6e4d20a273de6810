// src/cache.rs
//
// Reference cache: memoizes fetched modules in compiler-reference form,
// keyed by module name. One cache per orchestrator instance; populated
// lazily on first miss; never evicted (module sets are immutable for the
// life of the process). First successful fetch wins.
//
// This is the only stateful, write-shared component in the pipeline. The
// mutex guards only the check and populate steps; the fetch itself runs
// with no lock held, so two racing misses on the same name may both fetch,
// but population is idempotent and the cache ends with exactly one entry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::ModuleFetcher;
use crate::resolver::ModuleName;

/// Compiler-consumable handle for one fetched module. Immutable once
/// created; only ever used as a compilation input.
#[derive(Debug, Clone)]
pub struct ModuleReference {
    name: ModuleName,
    bytes: Arc<[u8]>,
}

impl ModuleReference {
    pub fn new(name: ModuleName, bytes: Vec<u8>) -> Self {
        ModuleReference {
            name,
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// ModuleName -> ModuleReference map shared by every compilation request
/// issued through one orchestrator instance.
#[derive(Default)]
pub struct ReferenceCache {
    entries: Mutex<HashMap<ModuleName, ModuleReference>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached reference for `name`, fetching and converting the
    /// raw bytes on a miss. A soft fetch failure propagates as-is; policy
    /// (skip vs abort) is the orchestrator's decision, not the cache's.
    pub async fn get_or_fetch(
        &self,
        name: &ModuleName,
        fetcher: &dyn ModuleFetcher,
    ) -> Result<ModuleReference, FetchError> {
        if let Some(reference) = self.entries.lock().await.get(name) {
            debug!(module = %name, "reference cache hit");
            return Ok(reference.clone());
        }

        let bytes = fetcher.fetch(name).await?;

        let mut entries = self.entries.lock().await;
        let reference = entries
            .entry(name.clone())
            .or_insert_with(|| ModuleReference::new(name.clone(), bytes));
        Ok(reference.clone())
    }

    pub async fn contains(&self, name: &ModuleName) -> bool {
        self.entries.lock().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed bytes for every module and counts underlying fetches.
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Self {
            CountingFetcher {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModuleFetcher for CountingFetcher {
        async fn fetch(&self, name: &ModuleName) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(name.as_str().as_bytes().to_vec())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ModuleFetcher for FailingFetcher {
        async fn fetch(&self, name: &ModuleName) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Missing {
                module: name.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn second_lookup_hits_cache_with_no_fetch() {
        let cache = ReferenceCache::new();
        let fetcher = CountingFetcher::new();
        let name = ModuleName::new("calc.core");

        let first = cache.get_or_fetch(&name, &fetcher).await.unwrap();
        let second = cache.get_or_fetch(&name, &fetcher).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first.bytes(), second.bytes());
    }

    #[tokio::test]
    async fn failed_fetch_populates_nothing() {
        let cache = ReferenceCache::new();
        let name = ModuleName::new("ghost");

        assert!(cache.get_or_fetch(&name, &FailingFetcher).await.is_err());
        assert!(!cache.contains(&name).await);

        // A later fetcher that does know the module still gets a chance.
        let fetcher = CountingFetcher::new();
        assert!(cache.get_or_fetch(&name, &fetcher).await.is_ok());
        assert!(cache.contains(&name).await);
    }

    #[tokio::test]
    async fn concurrent_misses_for_one_name_leave_one_entry() {
        let cache = Arc::new(ReferenceCache::new());
        let fetcher = Arc::new(CountingFetcher::new());
        let name = ModuleName::new("shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetcher = Arc::clone(&fetcher);
            let name = name.clone();
            handles.push(tokio::spawn(async move {
                cache.get_or_fetch(&name, fetcher.as_ref()).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(cache.len().await, 1);
    }
}
