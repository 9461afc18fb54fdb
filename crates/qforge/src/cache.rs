//! Result cache for SELECT queries.
//!
//! Keyed by adapter instance and compiled SQL, bounded by an LRU capacity, with a
//! per-entry lifetime. The cache is an explicit object handed to an adapter; nothing
//! here is global.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default number of entries kept by [`QueryCache::default`].
pub const DEFAULT_CAPACITY: usize = 256;

/// A buffered, serializable result: column names and raw rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// `(adapter instance, compiled SQL)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    instance: u64,
    sql: String,
}

impl CacheKey {
    pub fn new(instance: u64, sql: impl Into<String>) -> Self {
        Self {
            instance,
            sql: sql.into(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[derive(Debug)]
struct Entry {
    rows: Arc<CachedRows>,
    expires_at: Instant,
}

#[derive(Debug)]
struct QueryCacheInner {
    capacity: usize,
    map: HashMap<CacheKey, Entry>,
    order: VecDeque<CacheKey>,
}

/// TTL + LRU cache of SELECT results.
#[derive(Debug)]
pub struct QueryCache {
    inner: Mutex<QueryCacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueryCacheInner {
                capacity,
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueryCacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A live entry for `key`; expired entries are dropped on the way.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedRows>> {
        let mut inner = self.lock();
        let (rows, expired) = {
            let entry = inner.map.get(key)?;
            (Arc::clone(&entry.rows), Instant::now() >= entry.expires_at)
        };
        if expired {
            inner.map.remove(key);
            inner.remove_from_order(key);
            return None;
        }
        inner.touch(key);
        Some(rows)
    }

    /// Store `rows` under `key` for `lifetime`. A zero lifetime stores an entry
    /// that is already expired.
    pub fn insert(&self, key: CacheKey, rows: CachedRows, lifetime: Duration) -> Arc<CachedRows> {
        let rows = Arc::new(rows);
        let entry = Entry {
            rows: Arc::clone(&rows),
            expires_at: Instant::now() + lifetime,
        };
        let mut inner = self.lock();
        if inner.map.insert(key.clone(), entry).is_some() {
            inner.touch(&key);
        } else {
            inner.order.push_back(key);
        }
        inner.evict_if_needed();
        rows
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut inner = self.lock();
        let removed = inner.map.remove(key).is_some();
        if removed {
            inner.remove_from_order(key);
        }
        removed
    }

    /// Drop every entry belonging to one adapter instance.
    pub fn invalidate_instance(&self, instance: u64) -> usize {
        let mut inner = self.lock();
        let before = inner.map.len();
        inner.map.retain(|k, _| k.instance != instance);
        inner.order.retain(|k| k.instance != instance);
        before - inner.map.len()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.map.len();
        inner.map.retain(|_, e| now < e.expires_at);
        let QueryCacheInner { map, order, .. } = &mut *inner;
        order.retain(|k| map.contains_key(k));
        before - inner.map.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryCacheInner {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove_from_order(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let _ = self.order.remove(pos);
        }
    }

    fn evict_if_needed(&mut self) {
        if self.capacity == 0 {
            self.map.clear();
            self.order.clear();
            return;
        }

        while self.map.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let _ = self.map.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: i64) -> CachedRows {
        CachedRows {
            columns: vec!["n".into()],
            rows: vec![vec![Value::Int(n)]],
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn hit_within_lifetime() {
        let cache = QueryCache::new(4);
        let key = CacheKey::new(1, "SELECT 1");
        cache.insert(key.clone(), rows(1), HOUR);
        assert_eq!(cache.get(&key).unwrap().rows[0][0], Value::Int(1));
        assert!(cache.get(&CacheKey::new(2, "SELECT 1")).is_none());
    }

    #[test]
    fn zero_lifetime_is_expired() {
        let cache = QueryCache::new(4);
        let key = CacheKey::new(1, "SELECT 1");
        cache.insert(key.clone(), rows(1), Duration::ZERO);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction_keeps_recent() {
        let cache = QueryCache::new(2);
        let a = CacheKey::new(1, "a");
        let b = CacheKey::new(1, "b");
        let c = CacheKey::new(1, "c");
        cache.insert(a.clone(), rows(1), HOUR);
        cache.insert(b.clone(), rows(2), HOUR);
        cache.get(&a);
        cache.insert(c.clone(), rows(3), HOUR);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn invalidate_and_purge() {
        let cache = QueryCache::new(8);
        cache.insert(CacheKey::new(1, "a"), rows(1), HOUR);
        cache.insert(CacheKey::new(2, "a"), rows(1), HOUR);
        cache.insert(CacheKey::new(1, "b"), rows(1), Duration::ZERO);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.invalidate(&CacheKey::new(2, "a")));
        assert!(!cache.invalidate(&CacheKey::new(2, "a")));
        assert_eq!(cache.invalidate_instance(1), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn cached_rows_serialize() {
        let json = serde_json::to_string(&rows(7)).unwrap();
        let back: CachedRows = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rows(7));
    }
}
