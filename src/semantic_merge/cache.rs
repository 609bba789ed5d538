//! Write-once embedding cache keyed by chunk id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Chunk-id keyed cache of embedding vectors.
///
/// A vector is computed at most once per chunk id per run: later inserts for
/// an id that is already present are ignored, which makes concurrent batch
/// resolution safe without coordination. Lookup counters feed run telemetry.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    vectors: RwLock<HashMap<String, Arc<Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached vector for `id`, if any. Counts toward hit/miss telemetry.
    pub fn get(&self, id: &str) -> Option<Arc<Vec<f32>>> {
        let found = self.vectors.read().get(id).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Whether `id` already has a vector, without touching the counters.
    pub fn contains(&self, id: &str) -> bool {
        self.vectors.read().contains_key(id)
    }

    /// Stores a vector for `id` unless one is already present.
    pub fn insert(&self, id: impl Into<String>, vector: Vec<f32>) {
        self.vectors
            .write()
            .entry(id.into())
            .or_insert_with(|| Arc::new(vector));
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
