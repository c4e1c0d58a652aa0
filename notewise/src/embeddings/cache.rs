use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Thread-safe LRU cache of query embeddings.
///
/// Keys are hashes of the trimmed query text. A capacity of zero disables the
/// cache; every lookup misses and nothing is stored.
#[derive(Clone)]
pub struct QueryEmbeddingCache {
    cache: Option<Arc<Mutex<LruCache<String, Vec<f32>>>>>,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Arc::new(Mutex::new(LruCache::new(cap)))),
        }
    }

    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(&Self::generate_key(query)).cloned()
    }

    /// If the cache is at capacity the least recently used entry is evicted.
    pub fn put(&self, query: &str, embedding: Vec<f32>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Ok(mut cache) = cache.lock() {
            cache.put(Self::generate_key(query), embedding);
        }
    }

    pub fn len(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|cache| cache.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn generate_key(query: &str) -> String {
        let mut hasher = DefaultHasher::new();
        query.trim().as_bytes().hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}
