// src/tokenizer/cache.rs

use rustc_hash::FxHashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::RwLock;

/// Number of entries a model cache holds by default.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
/// Words longer than this (in bytes) are never cached.
pub const MAX_LENGTH: usize = 256;

/// A bounded, thread-safe memo table.
///
/// Lookups and inserts use `try_read`/`try_write`, so a contended lock is simply
/// treated as a miss: the cache never blocks an encode. Once `capacity` entries
/// are stored, new entries are dropped until the cache is cleared.
#[derive(Debug)]
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    map: RwLock<FxHashMap<K, V>>,
    pub capacity: usize,
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let map = RwLock::new(FxHashMap::with_capacity_and_hasher(
            capacity.min(DEFAULT_CACHE_CAPACITY),
            Default::default(),
        ));
        Cache { map, capacity }
    }

    /// An empty cache with the same capacity.
    pub fn fresh(&self) -> Self {
        Self::new(self.capacity)
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.map.write() {
            map.clear();
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.try_read().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        // Cheap check under the read lock first, most calls end here once full.
        match self.map.try_read() {
            Ok(map) if map.len() < self.capacity => {}
            _ => return,
        }
        if let Ok(mut map) = self.map.try_write() {
            if map.len() < self.capacity {
                map.insert(key, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        if let Ok(mut map) = self.map.write() {
            map.clear();
            map.shrink_to(capacity.min(DEFAULT_CACHE_CAPACITY));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_growing_at_capacity() {
        let cache: Cache<String, u32> = Cache::new(2);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.set("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), None);
    }

    #[test]
    fn clear_and_resize() {
        let mut cache: Cache<String, u32> = Cache::default();
        cache.set("a".into(), 1);
        cache.clear();
        assert!(cache.is_empty());

        cache.resize(1);
        cache.set("x".into(), 1);
        cache.set("y".into(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.fresh().capacity, 1);
    }
}
