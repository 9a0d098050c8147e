use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use conductor_errors::OrchestratorError;
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::backend::Embedder;

enum Store {
    Unbounded(Mutex<HashMap<String, Vec<Vec<f32>>>>),
    Bounded(Mutex<LruCache<String, Vec<Vec<f32>>>>),
}

/// Memoizing wrapper around an [`Embedder`]. Serves repeated calls for the
/// same ordered list of texts from an in-memory map keyed by a fingerprint
/// that is insensitive to object identity but sensitive to element order and
/// content (spec.md §4.5).
///
/// Unbounded by default; pass a capacity via [`CachingEmbedder::with_capacity`]
/// to bound memory use with LRU eviction (spec.md §9 open question (b)).
pub struct CachingEmbedder {
    inner: Box<dyn Embedder>,
    store: Store,
}

impl CachingEmbedder {
    pub fn new(inner: Box<dyn Embedder>) -> Self {
        Self {
            inner,
            store: Store::Unbounded(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_capacity(inner: Box<dyn Embedder>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner,
            store: Store::Bounded(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn get(&self, key: &str) -> Option<Vec<Vec<f32>>> {
        match &self.store {
            Store::Unbounded(map) => map.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned(),
            Store::Bounded(cache) => cache.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned(),
        }
    }

    fn put(&self, key: String, value: Vec<Vec<f32>>) {
        match &self.store {
            Store::Unbounded(map) => {
                map.lock().unwrap_or_else(|p| p.into_inner()).insert(key, value);
            }
            Store::Bounded(cache) => {
                cache.lock().unwrap_or_else(|p| p.into_inner()).put(key, value);
            }
        }
    }
}

/// Hashes the ordered list of texts with a length-prefixed separator so that
/// `["ab", "c"]` and `["a", "bc"]` fingerprint differently.
fn fingerprint(texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((texts.len() as u64).to_le_bytes());
    for text in texts {
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OrchestratorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let key = fingerprint(texts);
        if let Some(cached) = self.get(&key) {
            return Ok(cached);
        }
        let vectors = self.inner.embed_texts(texts).await?;
        self.put(key, vectors.clone());
        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn id(&self) -> &str {
        self.inner.id()
    }
}
