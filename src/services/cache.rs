//! Load result memoization
//!
//! Keeps the last parsed [`LoadResult`] per dataset, keyed by a fingerprint of
//! the dataset definition and the raw bytes of every source file. Rows are
//! shared through `Arc` and never mutated after load.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::services::data_loader::{LoadResult, SourceFile};
use crate::types::DatasetSpec;

struct CacheEntry {
    fingerprint: u64,
    result: Arc<LoadResult>,
}

/// In-memory memo of dataset loads
#[derive(Default)]
pub struct LoadCache {
    entries: HashMap<String, CacheEntry>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of a dataset definition plus its source contents
    pub fn fingerprint(dataset: &DatasetSpec, files: &[SourceFile]) -> u64 {
        let mut hasher = DefaultHasher::new();
        // Definition changes (aliases, metrics) change the parsed rows too
        serde_json::to_string(dataset)
            .unwrap_or_default()
            .hash(&mut hasher);
        for file in files {
            file.path.hash(&mut hasher);
            file.category.hash(&mut hasher);
            file.bytes.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Cached result for `dataset` if it was built from the same fingerprint
    pub fn get(&self, dataset: &str, fingerprint: u64) -> Option<Arc<LoadResult>> {
        self.entries
            .get(dataset)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| Arc::clone(&entry.result))
    }

    /// Store a result, replacing any older entry for the same dataset
    pub fn insert(&mut self, dataset: &str, fingerprint: u64, result: Arc<LoadResult>) {
        self.entries.insert(
            dataset.to_string(),
            CacheEntry {
                fingerprint,
                result,
            },
        );
    }

    pub fn invalidate(&mut self, dataset: &str) {
        self.entries.remove(dataset);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
