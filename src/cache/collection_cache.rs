//! Per-type entity cache with site-overlay fallback.
//!
//! For one type id, a [`CollectionEntityCache`] keeps three maps per
//! collection: values by entity id, entity id by URI, and entity ids by
//! scope name. Collection-local entries are read from disk on first use
//! (scope `nosite`); overlay entries come from the same cache keyed by the
//! site data collection.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::entity::{Entity, EntityValues, Kind, Origin, Scope};
use crate::error::StoreResult;
use crate::layout::SITE_DATA_ID;

use super::lock_err;
use super::object_cache::{CacheKey, ObjectCacheRegistry};

const BY_ID: &str = "entities_by_id";
const BY_URI: &str = "entity_ids_by_uri";
const BY_SCOPE: &str = "entity_ids_by_scope";

/// Values of one entity as held in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    /// Id of the collection the values were read from.
    pub parent_id: String,
    /// Where the values were found within that collection.
    pub origin: Origin,
    /// The entity values.
    pub values: EntityValues,
}

/// Cache of every entity of one type, across collections.
#[derive(Debug)]
pub struct CollectionEntityCache {
    type_id: String,
    by_id: ObjectCacheRegistry<CachedEntity>,
    by_uri: ObjectCacheRegistry<String>,
    by_scope: ObjectCacheRegistry<Vec<String>>,
    loaded: Mutex<HashSet<String>>,
}

impl CollectionEntityCache {
    /// Creates an empty cache for `type_id`.
    #[must_use]
    pub fn new(type_id: &str) -> Self {
        Self {
            type_id: type_id.to_string(),
            by_id: ObjectCacheRegistry::new(),
            by_uri: ObjectCacheRegistry::new(),
            by_scope: ObjectCacheRegistry::new(),
            loaded: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the cached type id.
    #[must_use]
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    fn key(&self, cache_kind: &str, coll_id: &str) -> CacheKey {
        CacheKey::new(cache_kind, &self.type_id, coll_id)
    }

    fn is_loaded(&self, coll_id: &str) -> StoreResult<bool> {
        let loaded = self.loaded.lock().map_err(|_| lock_err("collection_cache.loaded"))?;
        Ok(loaded.contains(coll_id))
    }

    /// Reads every collection-local entity under `parent` if not already cached.
    fn ensure_loaded(&self, parent: &Entity, kind: &Kind) -> StoreResult<()> {
        let coll_id = parent.owner_id();
        if self.is_loaded(coll_id)? {
            return Ok(());
        }
        let by_id = self.by_id.get_cache(&self.key(BY_ID, coll_id))?;
        let by_uri = self.by_uri.get_cache(&self.key(BY_URI, coll_id))?;
        let mut count = 0usize;
        for entity in parent.children(kind, Scope::NoSite)? {
            let origin = entity.origin().unwrap_or(Origin::Primary);
            let id = entity.id().to_string();
            if let Some(uri) = entity.uri() {
                by_uri.set(uri, id.clone())?;
            }
            let cached = CachedEntity {
                parent_id: coll_id.to_string(),
                origin,
                values: entity.into_values().unwrap_or_default(),
            };
            by_id.set(&id, cached)?;
            count += 1;
        }
        self.loaded
            .lock()
            .map_err(|_| lock_err("collection_cache.loaded"))?
            .insert(coll_id.to_string());
        debug!(type_id = %self.type_id, coll_id, count, "populated entity cache");
        Ok(())
    }

    fn lookup(&self, parent: &Entity, kind: &Kind, id: &str) -> StoreResult<Option<CachedEntity>> {
        self.ensure_loaded(parent, kind)?;
        let by_id = self.by_id.get_cache(&self.key(BY_ID, parent.owner_id()))?;
        by_id.get(id)
    }

    fn make_entity(parent: &Entity, kind: &Kind, id: &str, cached: CachedEntity, overlay: bool) -> StoreResult<Entity> {
        let origin = if overlay { Origin::Alt } else { cached.origin };
        Ok(parent.child(kind.clone(), id)?.restore(cached.values, origin))
    }

    /// Returns an entity of `kind` under `parent`, consulting the site overlay when `scope` allows.
    pub fn get_entity(&self, parent: &Entity, kind: &Kind, id: &str, scope: Scope) -> StoreResult<Option<Entity>> {
        if scope.includes_local() {
            if let Some(cached) = self.lookup(parent, kind, id)? {
                return Self::make_entity(parent, kind, id, cached, false).map(Some);
            }
        }
        if scope.includes_alt(kind) {
            if let Some(site_parent) = parent.alt_entity() {
                if let Some(cached) = self.lookup(&site_parent, kind, id)? {
                    return Self::make_entity(parent, kind, id, cached, true).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Returns the entity whose URI is `uri`, local entries first.
    ///
    /// A URI index hit whose id is no longer cached is reported as absent.
    pub fn get_entity_from_uri(&self, parent: &Entity, kind: &Kind, uri: &str, scope: Scope) -> StoreResult<Option<Entity>> {
        let mut sources = Vec::new();
        if scope.includes_local() {
            sources.push(parent.clone());
        }
        if scope.includes_alt(kind) {
            if let Some(site_parent) = parent.alt_entity() {
                sources.push(site_parent);
            }
        }
        for source in &sources {
            self.ensure_loaded(source, kind)?;
            let by_uri = self.by_uri.get_cache(&self.key(BY_URI, source.owner_id()))?;
            if let Some(id) = by_uri.get(uri)? {
                let overlay = source.owner_id() != parent.owner_id();
                let by_id = self.by_id.get_cache(&self.key(BY_ID, source.owner_id()))?;
                return match by_id.get(&id)? {
                    Some(cached) => Self::make_entity(parent, kind, &id, cached, overlay).map(Some),
                    None => Ok(None),
                };
            }
        }
        Ok(None)
    }

    fn local_ids(&self, parent: &Entity, kind: &Kind) -> StoreResult<Vec<String>> {
        self.ensure_loaded(parent, kind)?;
        self.by_id.get_cache(&self.key(BY_ID, parent.owner_id()))?.keys()
    }

    /// Returns the ids of entities visible in `scope`: local ids first, then overlay ids not already listed.
    pub fn get_entity_ids(&self, parent: &Entity, kind: &Kind, scope: Scope) -> StoreResult<Vec<String>> {
        let by_scope = self.by_scope.get_cache(&self.key(BY_SCOPE, parent.owner_id()))?;
        if let Some(ids) = by_scope.get(scope.as_str())? {
            return Ok(ids);
        }
        let mut ids = if scope.includes_local() {
            self.local_ids(parent, kind)?
        } else {
            Vec::new()
        };
        if scope.includes_alt(kind) {
            if let Some(site_parent) = parent.alt_entity() {
                for id in self.local_ids(&site_parent, kind)? {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        by_scope.set(scope.as_str(), ids.clone())?;
        Ok(ids)
    }

    /// Returns every entity visible in `scope`, in the order of [`Self::get_entity_ids`].
    pub fn get_entities(&self, parent: &Entity, kind: &Kind, scope: Scope) -> StoreResult<Vec<Entity>> {
        let mut out = Vec::new();
        for id in self.get_entity_ids(parent, kind, scope)? {
            if let Some(e) = self.get_entity(parent, kind, &id, scope)? {
                out.push(e);
            }
        }
        Ok(out)
    }

    /// Records a saved entity. The scope index of its collection is dropped.
    pub fn set_entity(&self, entity: &Entity) -> StoreResult<()> {
        let coll_id = entity.location().owner.clone();
        if self.is_loaded(&coll_id)? {
            let by_id = self.by_id.get_cache(&self.key(BY_ID, &coll_id))?;
            let by_uri = self.by_uri.get_cache(&self.key(BY_URI, &coll_id))?;
            let cached = CachedEntity {
                parent_id: coll_id.clone(),
                origin: Origin::Primary,
                values: entity.values().cloned().unwrap_or_default(),
            };
            let new_uri = entity.uri().map(str::to_string);
            let id = entity.id().to_string();
            by_id.access(|map| -> StoreResult<()> {
                let old = map.insert(id.clone(), cached);
                let old_uri = old.and_then(|o| {
                    let restored = entity.clone().restore(o.values, o.origin);
                    restored.uri().map(str::to_string)
                });
                by_uri.access(|uris| {
                    if let Some(old_uri) = old_uri {
                        if uris.get(&old_uri) == Some(&id) {
                            uris.remove(&old_uri);
                        }
                    }
                    if let Some(uri) = new_uri {
                        uris.insert(uri, id.clone());
                    }
                })
            })??;
        }
        self.flush_scopes(&coll_id)
    }

    /// Forgets an entity of collection `coll_id`. The scope index of that collection is dropped.
    pub fn remove_entity(&self, coll_id: &str, id: &str) -> StoreResult<Option<CachedEntity>> {
        let mut removed = None;
        if self.is_loaded(coll_id)? {
            let by_id = self.by_id.get_cache(&self.key(BY_ID, coll_id))?;
            let by_uri = self.by_uri.get_cache(&self.key(BY_URI, coll_id))?;
            removed = by_id.access(|map| -> StoreResult<Option<CachedEntity>> {
                let old = map.remove(id);
                if old.is_some() {
                    by_uri.access(|uris| uris.retain(|_, v| v.as_str() != id))?;
                }
                Ok(old)
            })??;
        }
        self.flush_scopes(coll_id)?;
        Ok(removed)
    }

    fn flush_scopes(&self, coll_id: &str) -> StoreResult<()> {
        if coll_id == SITE_DATA_ID {
            // Every collection's scope lists include overlay ids.
            self.by_scope.clear()?;
        } else {
            self.by_scope.remove_cache(&self.key(BY_SCOPE, coll_id))?;
        }
        Ok(())
    }

    /// Drops everything cached for one collection.
    pub fn flush_cache(&self, coll_id: &str) -> StoreResult<bool> {
        let by_id = self.by_id.remove_cache(&self.key(BY_ID, coll_id))?;
        let by_uri = self.by_uri.remove_cache(&self.key(BY_URI, coll_id))?;
        let by_scope = self.by_scope.remove_cache(&self.key(BY_SCOPE, coll_id))?;
        let any = by_id || by_uri || by_scope;
        let was_loaded = self
            .loaded
            .lock()
            .map_err(|_| lock_err("collection_cache.loaded"))?
            .remove(coll_id);
        if any || was_loaded {
            info!(type_id = %self.type_id, coll_id, "flushed collection entity cache");
        }
        Ok(any || was_loaded)
    }

    /// Drops everything cached for every collection.
    pub fn flush_all(&self) -> StoreResult<()> {
        self.by_id.clear()?;
        self.by_uri.clear()?;
        self.by_scope.clear()?;
        self.loaded
            .lock()
            .map_err(|_| lock_err("collection_cache.loaded"))?
            .clear();
        info!(type_id = %self.type_id, "flushed all collection entity caches");
        Ok(())
    }
}
