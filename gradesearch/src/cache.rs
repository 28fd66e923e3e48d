//! Bounded LRU caches for search responses and detail pages.

use crate::interface::SearchResponse;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hit/miss counters and occupancy of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

/// String-keyed LRU store behind a mutex.
///
/// `get` refreshes recency, `has` does not. Inserting a new key at capacity
/// evicts exactly the least-recently-used entry; inserting an existing key
/// replaces its value.
pub struct LruStore<V: Clone> {
    entries: Mutex<LruCache<String, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> LruStore<V> {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.entries.lock().get(key).cloned();
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Insert or replace. Returns the key evicted to make room, if any.
    pub fn set(&self, key: String, value: V) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.push(key.clone(), value) {
            Some((old_key, _)) if old_key != key => Some(old_key),
            _ => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

/// Search responses keyed by normalized query text
pub type SearchCache = LruStore<Arc<SearchResponse>>;

/// Rendered detail payloads keyed by request path
pub type DetailCache = LruStore<serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_has() {
        let cache: LruStore<i32> = LruStore::new(3);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.set("a".into(), 1), None);
        assert!(cache.has("a"));
        assert_eq!(cache.get("a"), Some(1));
        assert!(!cache.has("b"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.len, 1);
        assert_eq!(stats.capacity, 3);
    }

    #[test]
    fn test_insert_at_capacity_evicts_least_recent() {
        let cache: LruStore<usize> = LruStore::new(50);
        for i in 0..50 {
            cache.set(format!("q{}", i), i);
        }
        assert_eq!(cache.len(), 50);

        assert_eq!(cache.set("q50".into(), 50), Some("q0".to_string()));
        assert_eq!(cache.len(), 50);
        assert!(!cache.has("q0"));
        assert!(cache.has("q1"));
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let cache: LruStore<usize> = LruStore::new(50);
        for i in 0..50 {
            cache.set(format!("q{}", i), i);
        }
        assert_eq!(cache.get("q0"), Some(0));

        assert_eq!(cache.set("q50".into(), 50), Some("q1".to_string()));
        assert!(cache.has("q0"));
        assert!(!cache.has("q1"));
    }

    #[test]
    fn test_has_does_not_refresh_recency() {
        let cache: LruStore<usize> = LruStore::new(2);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert!(cache.has("a"));

        assert_eq!(cache.set("c".into(), 3), Some("a".to_string()));
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let cache: LruStore<usize> = LruStore::new(2);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.set("a".into(), 10), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert!(cache.has("b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_keeps_bounds() {
        let cache: Arc<LruStore<usize>> = Arc::new(LruStore::new(16));
        let mut tasks = tokio::task::JoinSet::new();
        for worker in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                for i in 0..500 {
                    let key = format!("q{}", (worker * 7 + i) % 40);
                    if cache.get(&key).is_none() {
                        cache.set(key, i);
                    }
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let stats = cache.stats();
        assert!(stats.len <= 16);
        assert_eq!(stats.capacity, 16);
        assert_eq!(stats.hits + stats.misses, 8 * 500);

        for i in 0..16 {
            cache.set(format!("fill{}", i), i);
        }
        assert_eq!(cache.get("fill0"), Some(0));
        assert_eq!(cache.set("last".into(), 99), Some("fill1".to_string()));
        assert!(cache.has("fill0"));
        assert_eq!(cache.len(), 16);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache: LruStore<u8> = LruStore::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.has("b"));
    }
}
