//! In-process caches of entity values.
//!
//! [`StoreCaches`] is owned by a site handle and hands out one
//! [`CollectionEntityCache`] per type id. Nothing here is a process-wide
//! singleton; dropping the site drops its caches.

pub mod collection_cache;
pub mod object_cache;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::{StoreError, StoreResult};

pub use collection_cache::{CachedEntity, CollectionEntityCache};
pub use object_cache::{CacheKey, ObjectCache, ObjectCacheRegistry};

pub(crate) fn lock_err(context: &'static str) -> StoreError {
    StoreError::cache(format!("poisoned lock: {context}"))
}

/// Entity caches for every type id of one site.
#[derive(Debug, Default)]
pub struct StoreCaches {
    by_type: Mutex<HashMap<String, Arc<CollectionEntityCache>>>,
}

impl StoreCaches {
    /// Creates an empty set of caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache for `type_id`, creating it if needed.
    pub fn for_type(&self, type_id: &str) -> StoreResult<Arc<CollectionEntityCache>> {
        let mut by_type = self.by_type.lock().map_err(|_| lock_err("store_caches.for_type"))?;
        let cache = by_type
            .entry(type_id.to_string())
            .or_insert_with(|| Arc::new(CollectionEntityCache::new(type_id)));
        Ok(Arc::clone(cache))
    }

    fn all(&self) -> StoreResult<Vec<Arc<CollectionEntityCache>>> {
        let by_type = self.by_type.lock().map_err(|_| lock_err("store_caches.all"))?;
        Ok(by_type.values().cloned().collect())
    }

    /// Drops every cached entry of collection `coll_id`, for all types.
    pub fn flush_collection(&self, coll_id: &str) -> StoreResult<()> {
        for cache in self.all()? {
            cache.flush_cache(coll_id)?;
        }
        info!(coll_id, "flushed collection caches");
        Ok(())
    }

    /// Drops every cached entry, including the site overlay.
    pub fn flush_all(&self) -> StoreResult<()> {
        for cache in self.all()? {
            cache.flush_all()?;
        }
        info!("flushed all caches");
        Ok(())
    }
}
