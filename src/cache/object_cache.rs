//! Keyed object caches with exclusive per-key access.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{StoreError, StoreResult};

use super::lock_err;

/// Identifies one object cache: what is cached, for which type, in which collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// What the cache holds (`entities_by_id`, `entity_ids_by_uri`, ...).
    pub cache_kind: String,
    /// Type id of the cached entities.
    pub type_id: String,
    /// Owning collection id.
    pub coll_id: String,
}

impl CacheKey {
    /// Creates a cache key.
    #[must_use]
    pub fn new(cache_kind: &str, type_id: &str, coll_id: &str) -> Self {
        Self {
            cache_kind: cache_kind.to_string(),
            type_id: type_id.to_string(),
            coll_id: coll_id.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cache_kind, self.type_id, self.coll_id)
    }
}

/// A string-keyed map guarded by one mutex.
///
/// Every operation is exclusive with every other operation on the same
/// cache. A closed cache rejects all further access.
#[derive(Debug)]
pub struct ObjectCache<V> {
    key: CacheKey,
    // None once closed
    state: Mutex<Option<HashMap<String, V>>>,
}

impl<V: Clone> ObjectCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            state: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Returns the cache key.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Runs `f` with exclusive access to the cached map.
    ///
    /// # Errors
    /// `Cache` if the cache has been closed or its lock is poisoned.
    pub fn access<R>(&self, f: impl FnOnce(&mut HashMap<String, V>) -> R) -> StoreResult<R> {
        let mut guard = self.state.lock().map_err(|_| lock_err("object_cache.access"))?;
        match guard.as_mut() {
            Some(map) => Ok(f(map)),
            None => Err(StoreError::cache(format!("access to closed cache {}", self.key))),
        }
    }

    /// Returns a copy of the value for `k`.
    pub fn get(&self, k: &str) -> StoreResult<Option<V>> {
        self.access(|map| map.get(k).cloned())
    }

    /// Returns the value for `k`, or `default` if absent.
    pub fn get_or(&self, k: &str, default: V) -> StoreResult<V> {
        Ok(self.get(k)?.unwrap_or(default))
    }

    /// Stores `v` under `k`, returning the previous value.
    pub fn set(&self, k: &str, v: V) -> StoreResult<Option<V>> {
        self.access(|map| map.insert(k.to_string(), v))
    }

    /// Removes and returns the value for `k`.
    pub fn pop(&self, k: &str) -> StoreResult<Option<V>> {
        self.access(|map| map.remove(k))
    }

    /// Returns the cached keys, sorted.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        self.access(|map| {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            keys
        })
    }

    /// Returns the number of cached values.
    pub fn len(&self) -> StoreResult<usize> {
        self.access(|map| map.len())
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.access(|map| map.is_empty())
    }

    /// Drops every cached value; the cache stays usable.
    pub fn flush(&self) -> StoreResult<()> {
        self.access(HashMap::clear)?;
        debug!(key = %self.key, "flushed object cache");
        Ok(())
    }

    /// Drops every cached value and rejects further access.
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.state.lock().map_err(|_| lock_err("object_cache.close"))?;
        *guard = None;
        debug!(key = %self.key, "closed object cache");
        Ok(())
    }

    /// Returns true once the cache has been closed.
    pub fn is_closed(&self) -> StoreResult<bool> {
        let guard = self.state.lock().map_err(|_| lock_err("object_cache.is_closed"))?;
        Ok(guard.is_none())
    }
}

/// Owns the object caches of one value type, created on first request.
#[derive(Debug)]
pub struct ObjectCacheRegistry<V> {
    caches: Mutex<HashMap<CacheKey, Arc<ObjectCache<V>>>>,
}

impl<V> Default for ObjectCacheRegistry<V> {
    fn default() -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> ObjectCacheRegistry<V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache for `key`, creating it if needed.
    pub fn get_cache(&self, key: &CacheKey) -> StoreResult<Arc<ObjectCache<V>>> {
        let mut caches = self.caches.lock().map_err(|_| lock_err("registry.get_cache"))?;
        let cache = caches
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ObjectCache::new(key.clone())));
        Ok(Arc::clone(cache))
    }

    /// Returns the cache for `key` only if it already exists.
    pub fn find_cache(&self, key: &CacheKey) -> StoreResult<Option<Arc<ObjectCache<V>>>> {
        let caches = self.caches.lock().map_err(|_| lock_err("registry.find_cache"))?;
        Ok(caches.get(key).cloned())
    }

    /// Closes and forgets the cache for `key`. Returns false if there was none.
    ///
    /// Holders of the closed cache get a `Cache` error on their next access.
    pub fn remove_cache(&self, key: &CacheKey) -> StoreResult<bool> {
        let removed = {
            let mut caches = self.caches.lock().map_err(|_| lock_err("registry.remove_cache"))?;
            caches.remove(key)
        };
        match removed {
            Some(cache) => {
                cache.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes and forgets every cache whose key satisfies `pred`.
    pub fn remove_matching(&self, pred: impl Fn(&CacheKey) -> bool) -> StoreResult<usize> {
        let removed: Vec<Arc<ObjectCache<V>>> = {
            let mut caches = self.caches.lock().map_err(|_| lock_err("registry.remove_matching"))?;
            let keys: Vec<CacheKey> = caches.keys().filter(|k| pred(k)).cloned().collect();
            keys.iter().filter_map(|k| caches.remove(k)).collect()
        };
        for cache in &removed {
            cache.close()?;
        }
        Ok(removed.len())
    }

    /// Closes and forgets every cache.
    pub fn clear(&self) -> StoreResult<usize> {
        self.remove_matching(|_| true)
    }
}
