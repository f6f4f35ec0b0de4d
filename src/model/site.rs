//! The site: root of the entity tree.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cache::StoreCaches;
use crate::config::StoreConfig;
use crate::entity::{Entity, EntityValues, Kind, Scope};
#[cfg(feature = "site-lock")]
use crate::entity::SiteLock;
use crate::error::StoreResult;
use crate::layout::SITE_DATA_ID;
use crate::vocab::{annal, rdfs};

use super::collection::Collection;

struct SiteInner {
    config: StoreConfig,
    root: Entity,
    caches: StoreCaches,
    #[cfg(feature = "site-lock")]
    _lock: Option<SiteLock>,
}

/// Handle on an open site. Cloning shares the caches (and lock) of the original.
#[derive(Clone)]
pub struct Site {
    inner: Arc<SiteInner>,
}

impl fmt::Debug for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Site")
            .field("dir", &self.inner.root.dir())
            .field("url", &self.inner.root.url())
            .finish_non_exhaustive()
    }
}

impl Site {
    /// Opens the site described by an already validated configuration.
    ///
    /// The site directory is created if missing; nothing else is written.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let dir = config.site_dir();
        std::fs::create_dir_all(&dir)?;
        #[cfg(feature = "site-lock")]
        let lock = if config.lock_site {
            Some(SiteLock::acquire(&dir)?)
        } else {
            None
        };
        let root = Entity::root(Kind::Site, "site", dir.clone(), &config.site_url(), dir);
        debug!(dir = %root.dir().display(), url = root.url(), "opened site");
        Ok(Self {
            inner: Arc::new(SiteInner {
                config,
                root,
                caches: StoreCaches::new(),
                #[cfg(feature = "site-lock")]
                _lock: lock,
            }),
        })
    }

    /// Writes the site description and creates the site data collection if missing.
    ///
    /// Existing site data is left in place; the site data context is regenerated.
    pub fn initialize(&self, label: &str) -> StoreResult<Collection> {
        let mut root = self.inner.root.clone();
        let mut values = EntityValues::new();
        values.insert(rdfs::LABEL.to_string(), json!(label));
        values.insert(
            rdfs::COMMENT.to_string(),
            json!(format!("Annalist site at {}", self.inner.config.site_url())),
        );
        root.set_values(values);
        root.save()?;

        let data = self.site_data_entity()?;
        if !data.exists(Scope::Coll) {
            let mut meta = EntityValues::new();
            meta.insert(rdfs::LABEL.to_string(), json!("Annalist site data"));
            meta.insert(annal::TYPE.to_string(), json!(annal::SITE_DATA));
            self.inner
                .root
                .create_child(Kind::Collection, SITE_DATA_ID, meta)?;
            info!(dir = %data.dir().display(), "created site data collection");
        }
        let coll = self.site_data()?;
        coll.generate_context()?;
        Ok(coll)
    }

    /// Returns the configuration the site was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the site root entity handle.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.inner.root
    }

    /// Returns the site directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.inner.root.dir()
    }

    /// Returns the site URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.inner.root.url()
    }

    /// Returns the caches shared by every collection of this site.
    #[must_use]
    pub fn caches(&self) -> &StoreCaches {
        &self.inner.caches
    }

    /// Returns the site description values, if the site has been initialized.
    pub fn values(&self) -> StoreResult<Option<EntityValues>> {
        let root = self.inner.root.clone();
        Ok(root.load(Scope::Coll)?.and_then(Entity::into_values))
    }

    fn site_data_entity(&self) -> StoreResult<Entity> {
        self.inner.root.child(Kind::Collection, SITE_DATA_ID)
    }

    /// Returns the site data collection (the overlay consulted by every collection).
    pub fn site_data(&self) -> StoreResult<Collection> {
        let entity = self.site_data_entity()?;
        let entity = match entity.clone().load(Scope::Coll)? {
            Some(loaded) => loaded,
            None => entity,
        };
        Ok(Collection::new(self.clone(), entity))
    }

    fn collection_entity(&self, coll_id: &str) -> StoreResult<Entity> {
        let alt = self.site_data_entity()?.location().clone();
        Ok(self.inner.root.child(Kind::Collection, coll_id)?.with_alt(alt))
    }

    /// Opens an existing collection. Unknown or invalid ids give `Ok(None)`.
    pub fn collection(&self, coll_id: &str) -> StoreResult<Option<Collection>> {
        if coll_id == SITE_DATA_ID {
            return self.site_data().map(Some);
        }
        let entity = match self.collection_entity(coll_id) {
            Ok(e) => e,
            Err(e) if e.is_invalid_id() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(entity
            .load(Scope::Coll)?
            .map(|loaded| Collection::new(self.clone(), loaded)))
    }

    /// Tests whether a collection exists.
    #[must_use]
    pub fn collection_exists(&self, coll_id: &str) -> bool {
        self.inner
            .root
            .child_exists(Kind::Collection, coll_id, Scope::Coll)
    }

    /// Returns the ids of user collections (the site data collection is not listed).
    pub fn collection_ids(&self) -> StoreResult<Vec<String>> {
        self.inner.root.child_ids(&Kind::Collection, Scope::Coll)
    }

    /// Opens every user collection.
    pub fn collections(&self) -> StoreResult<Vec<Collection>> {
        let mut out = Vec::new();
        for id in self.collection_ids()? {
            if let Some(coll) = self.collection(&id)? {
                out.push(coll);
            }
        }
        Ok(out)
    }

    /// Creates (or overwrites the description of) a collection.
    pub fn create_collection(&self, coll_id: &str, values: EntityValues) -> StoreResult<Collection> {
        let mut entity = self.collection_entity(coll_id)?;
        entity.set_values(values);
        entity.save()?;
        info!(coll_id, "created collection");
        let coll = Collection::new(self.clone(), entity);
        coll.generate_context()?;
        self.inner.caches.flush_collection(coll_id)?;
        Ok(coll)
    }

    /// Removes a collection and everything in it.
    pub fn remove_collection(&self, coll_id: &str) -> StoreResult<()> {
        self.inner.root.remove_child(Kind::Collection, coll_id)?;
        self.inner.caches.flush_collection(coll_id)?;
        info!(coll_id, "removed collection");
        Ok(())
    }

    /// Drops every cached entry, including the site data overlay.
    pub fn flush_caches(&self) -> StoreResult<()> {
        self.inner.caches.flush_all()
    }

    /// Returns the label recorded for the site, or its directory name.
    pub fn label(&self) -> StoreResult<String> {
        let label = self
            .values()?
            .and_then(|v| v.get(rdfs::LABEL).and_then(Value::as_str).map(str::to_string));
        Ok(label.unwrap_or_else(|| self.inner.root.id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path) -> Site {
        let config = StoreConfig::new(dir).validate().unwrap();
        Site::open(config).unwrap()
    }

    #[test]
    fn test_initialize_creates_site_data() {
        let dir = tempdir().unwrap();
        let site = open(dir.path());
        let data = site.initialize("Test site").unwrap();
        assert_eq!(data.id(), SITE_DATA_ID);
        assert!(dir.path().join("annalist_site/site_meta.jsonld").is_file());
        assert!(dir
            .path()
            .join("annalist_site/c/_annalist_site/d/coll_meta.jsonld")
            .is_file());
        assert!(dir
            .path()
            .join("annalist_site/c/_annalist_site/d/coll_context.jsonld")
            .is_file());
        assert_eq!(site.label().unwrap(), "Test site");
        // idempotent
        site.initialize("Test site").unwrap();
    }

    #[test]
    fn test_collection_lifecycle() {
        let dir = tempdir().unwrap();
        let site = open(dir.path());
        site.initialize("s").unwrap();
        assert!(site.collection_ids().unwrap().is_empty());

        let coll = site.create_collection("testcoll", EntityValues::new()).unwrap();
        assert_eq!(coll.url(), "/annalist/c/testcoll/");
        assert_eq!(site.collection_ids().unwrap(), vec!["testcoll".to_string()]);
        assert!(site.collection_exists("testcoll"));
        assert!(site.collection("testcoll").unwrap().is_some());
        assert!(site.collection("nocoll").unwrap().is_none());
        assert!(site.collection("bad/id").unwrap().is_none());

        site.remove_collection("testcoll").unwrap();
        assert!(site.collection_ids().unwrap().is_empty());
        assert!(site.remove_collection("testcoll").unwrap_err().is_not_found());
    }

    #[test]
    fn test_invalid_collection_id() {
        let dir = tempdir().unwrap();
        let site = open(dir.path());
        let err = site.create_collection("no spaces", EntityValues::new()).unwrap_err();
        assert!(err.is_invalid_id());
    }
}
