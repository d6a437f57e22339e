//! Bounded operation cache.
//!
//! Caches the results of semantic query operations. Eviction is by insertion
//! order: when the cache is full the oldest-inserted entry goes, regardless of
//! how recently it was read. That approximation of LRU is the documented
//! behavior and callers may rely on the exact eviction order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries; 0 disables caching.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    500
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// Identity of a cached operation result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Operation kind, e.g. `find_similar:task`.
    pub operation: String,
    /// Project the result belongs to; empty for cross-project operations.
    pub project_id: String,
    /// Query text.
    pub query: String,
    /// Requested result count.
    pub limit: usize,
}

impl CacheKey {
    /// Create a key.
    pub fn new(
        operation: impl Into<String>,
        project_id: impl Into<String>,
        query: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self {
            operation: operation.into(),
            project_id: project_id.into(),
            query: query.into(),
            limit,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0.0 before any lookup.
    pub hit_rate: f64,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<CacheKey, V>,
    order: VecDeque<CacheKey>,
}

/// Insertion-ordered bounded cache with hit/miss accounting.
#[derive(Debug)]
pub struct OperationCache<V> {
    max_entries: usize,
    inner: Mutex<CacheInner<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> OperationCache<V> {
    /// Create a cache holding at most `max_entries` results.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries)
    }

    // Entries are plain data, so a panic elsewhere cannot leave them
    // inconsistent; keep serving after poisoning.
    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Look up a result, counting the hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let found = self.lock().entries.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a result, evicting the oldest-inserted entries when full.
    pub fn insert(&self, key: CacheKey, value: V) {
        if self.max_entries == 0 {
            return;
        }
        let mut inner = self.lock();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        while inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    log::trace!("Evicted cache entry {}", oldest.operation);
                }
                None => break,
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    /// Drop every entry and zero the counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Drop entries matching a predicate. Returns how many were removed.
    pub fn invalidate_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.order.retain(|k| !predicate(k));
        inner.entries.retain(|k, _| !predicate(k));
        before - inner.entries.len()
    }

    /// Drop every entry belonging to a project.
    pub fn invalidate_project(&self, project_id: &str) -> usize {
        self.invalidate_where(|k| k.project_id == project_id)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of lookups that hit, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(q: &str) -> CacheKey {
        CacheKey::new("find_similar:task", "alpha", q, 5)
    }

    #[test]
    fn test_get_counts_hits_and_misses() {
        let cache = OperationCache::new(4);
        assert!(cache.get(&key("a")).is_none());
        cache.insert(key("a"), vec![1]);
        assert_eq!(cache.get(&key("a")), Some(vec![1]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_eviction_is_oldest_inserted_not_least_recent() {
        let cache = OperationCache::new(3);
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        cache.insert(key("c"), 3);

        // Reading "a" does not protect it.
        assert_eq!(cache.get(&key("a")), Some(1));

        cache.insert(key("d"), 4);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.get(&key("b")), Some(2));

        cache.insert(key("e"), 5);
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.get(&key("c")), Some(3));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = OperationCache::new(10);
        for i in 0..100 {
            cache.insert(key(&i.to_string()), i);
            assert!(cache.len() <= 10);
        }
        assert_eq!(cache.get(&key("90")), Some(90));
        assert!(cache.get(&key("89")).is_none());
    }

    #[test]
    fn test_reinsert_moves_to_back() {
        let cache = OperationCache::new(2);
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        cache.insert(key("a"), 10);
        cache.insert(key("c"), 3);

        assert_eq!(cache.get(&key("a")), Some(10));
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_limit_is_part_of_key() {
        let cache = OperationCache::new(4);
        cache.insert(CacheKey::new("op", "p", "q", 5), 5);
        assert!(cache.get(&CacheKey::new("op", "p", "q", 10)).is_none());
    }

    #[test]
    fn test_clear_resets_counters() {
        let cache = OperationCache::new(4);
        cache.insert(key("a"), 1);
        cache.get(&key("a"));
        cache.get(&key("z"));

        cache.clear();
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_invalidate_project() {
        let cache = OperationCache::new(8);
        cache.insert(CacheKey::new("op", "alpha", "q", 5), 1);
        cache.insert(CacheKey::new("op", "alpha", "r", 5), 2);
        cache.insert(CacheKey::new("op", "beta", "q", 5), 3);

        assert_eq!(cache.invalidate_project("alpha"), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = OperationCache::new(0);
        cache.insert(key("a"), 1);
        assert!(cache.is_empty());
    }
}
