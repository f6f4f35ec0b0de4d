//! On-disk entity with alternate-parent lookup.
//!
//! An [`Entity`] is a handle on one record's location in the site tree plus
//! (once loaded or set) its values. Children are addressed from their parent
//! handle: the parent fixes the primary directory and, for kinds that support
//! it, an alternate directory consulted when the child is absent locally.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionError, StoreError, StoreResult};
use crate::layout::{INITIAL_VALUES_ID, NEW_ID_WIDTH, SITE_DATA_ID};
use crate::util::ident::{make_type_entity_id, valid_id};
use crate::util::paths::{is_within, list_dir, read_json, write_json_atomic};
use crate::util::urls::entity_url_path;
use crate::vocab::{annal, jsonld, prov, rdfs};

use super::kind::Kind;
use super::scope::Scope;

/// The open property map stored for every entity.
pub type EntityValues = Map<String, Value>;

/// A directory in the site tree together with its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Absolute directory.
    pub dir: PathBuf,
    /// URL of the directory, with a trailing slash.
    pub url: String,
    /// Id of the collection that owns this location (empty for the site).
    pub owner: String,
}

/// Where a loaded entity was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The entity's own directory under its parent.
    Primary,
    /// The alternate (site overlay) directory.
    Alt,
    /// A directory or body file name used by an older release.
    Legacy,
}

/// One step of a path returned by [`Entity::enum_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member.
    Key(String),
    /// Array element.
    Index(usize),
}

#[derive(Debug, Clone)]
struct Resolved {
    origin: Origin,
    dir: PathBuf,
    body: PathBuf,
}

/// A record in the site tree.
#[derive(Debug, Clone)]
pub struct Entity {
    kind: Kind,
    id: String,
    site_root: PathBuf,
    primary: Location,
    alt: Option<Location>,
    legacy_dir: Option<PathBuf>,
    view_url: String,
    origin: Option<Origin>,
    found_dir: Option<PathBuf>,
    values: Option<EntityValues>,
}

fn with_slash(url: &str) -> String {
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

impl Entity {
    /// Creates a root handle with no parent.
    ///
    /// `site_root` bounds every write made through this handle or its descendants.
    #[must_use]
    pub fn root(kind: Kind, id: impl Into<String>, dir: PathBuf, url: &str, site_root: PathBuf) -> Self {
        let url = with_slash(url);
        Self {
            kind,
            id: id.into(),
            site_root,
            primary: Location {
                dir,
                url: url.clone(),
                owner: String::new(),
            },
            alt: None,
            legacy_dir: None,
            view_url: url,
            origin: None,
            found_dir: None,
            values: None,
        }
    }

    /// Attaches an alternate location consulted for children absent from this entity.
    #[must_use]
    pub fn with_alt(mut self, alt: Location) -> Self {
        self.alt = Some(alt);
        self
    }

    /// Builds the handle for a child of this entity, without touching storage.
    ///
    /// # Errors
    /// `InvalidId` if `id` is not a valid slug. The site data collection id is
    /// accepted for collections.
    pub fn child(&self, kind: Kind, id: &str) -> StoreResult<Self> {
        let allow_reserved = kind == Kind::Collection && id == SITE_DATA_ID;
        if !valid_id(id, allow_reserved) {
            return Err(StoreError::invalid_id(id));
        }

        let relpath = kind.relpath(id);
        let owner = if kind == Kind::Collection {
            id.to_string()
        } else {
            self.primary.owner.clone()
        };
        let primary = Location {
            dir: self.primary.dir.join(&relpath),
            url: with_slash(&format!("{}{relpath}", self.primary.url)),
            owner,
        };
        let alt = match (&self.alt, kind.altpath(id)) {
            (Some(parent_alt), Some(altpath)) => Some(Location {
                dir: parent_alt.dir.join(&altpath),
                url: with_slash(&format!("{}{altpath}", parent_alt.url)),
                owner: parent_alt.owner.clone(),
            }),
            _ => None,
        };
        let legacy_dir = kind.legacy_relpath(id).map(|p| self.primary.dir.join(p));
        let view_url = format!("{}{}", self.primary.url, kind.view_relpath(id));

        Ok(Self {
            kind,
            id: id.to_string(),
            site_root: self.site_root.clone(),
            primary,
            alt,
            legacy_dir,
            view_url,
            origin: None,
            found_dir: None,
            values: None,
        })
    }

    // Accessors

    /// Returns the kind of this entity.
    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Returns the entity id (slug).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the local type id.
    #[must_use]
    pub fn type_id(&self) -> &str {
        self.kind.type_id()
    }

    /// Returns `type_id/entity_id`, unique within a collection.
    #[must_use]
    pub fn type_entity_id(&self) -> String {
        make_type_entity_id(self.type_id(), &self.id)
    }

    /// Returns the primary directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.primary.dir
    }

    /// Returns the primary URL (trailing slash included).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.primary.url
    }

    /// Returns the URL used to view this entity.
    #[must_use]
    pub fn view_url(&self) -> &str {
        &self.view_url
    }

    /// Returns the path component of the view URL.
    #[must_use]
    pub fn view_url_path(&self) -> String {
        entity_url_path(&self.view_url, "")
    }

    /// Returns the primary location.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.primary
    }

    /// Returns the alternate location, if any.
    #[must_use]
    pub fn alt(&self) -> Option<&Location> {
        self.alt.as_ref()
    }

    /// Returns the root of the site tree this entity belongs to.
    #[must_use]
    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    /// Returns where the entity was found, once loaded or saved.
    #[must_use]
    pub fn origin(&self) -> Option<Origin> {
        self.origin
    }

    /// Marks where the entity was found (used when rebuilding from cached values).
    ///
    /// A legacy origin is resolved again, since the legacy body may sit in
    /// either the current or the old directory.
    pub fn set_origin(&mut self, origin: Origin) {
        self.origin = Some(origin);
        self.found_dir = match origin {
            Origin::Legacy => self
                .resolve(Scope::Coll)
                .filter(|r| r.origin == Origin::Legacy)
                .map(|r| r.dir),
            Origin::Primary | Origin::Alt => None,
        };
    }

    /// Rebuilds a loaded entity from values read earlier, as [`Entity::load`] would.
    #[must_use]
    pub fn restore(mut self, values: EntityValues, origin: Origin) -> Self {
        self.set_origin(origin);
        self.accept_loaded(values);
        self
    }

    /// Returns a handle on the alternate location, with no alternate of its own.
    #[must_use]
    pub fn alt_entity(&self) -> Option<Self> {
        let alt = self.alt.as_ref()?;
        Some(Self {
            kind: self.kind.clone(),
            id: self.id.clone(),
            site_root: self.site_root.clone(),
            primary: alt.clone(),
            alt: None,
            legacy_dir: None,
            view_url: alt.url.clone(),
            origin: None,
            found_dir: None,
            values: None,
        })
    }

    /// Returns the location the entity was read from.
    #[must_use]
    pub fn location_in_use(&self) -> &Location {
        match (self.origin, &self.alt) {
            (Some(Origin::Alt), Some(alt)) => alt,
            _ => &self.primary,
        }
    }

    /// Returns the directory the entity was read from (the primary one if not yet loaded).
    #[must_use]
    pub fn dir_in_use(&self) -> &Path {
        match &self.found_dir {
            Some(dir) => dir,
            None => &self.location_in_use().dir,
        }
    }

    /// Returns the URL at which the entity was actually found.
    #[must_use]
    pub fn url_in_use(&self) -> &str {
        &self.location_in_use().url
    }

    /// Returns the id of the collection that holds the copy in use.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.location_in_use().owner
    }

    /// Returns the path of the body file at the primary location.
    #[must_use]
    pub fn body_path(&self) -> PathBuf {
        self.primary.dir.join(self.kind.def().body_file)
    }

    // Values

    /// Returns the entity values, if loaded or set.
    #[must_use]
    pub fn values(&self) -> Option<&EntityValues> {
        self.values.as_ref()
    }

    /// Returns mutable entity values, if loaded or set.
    pub fn values_mut(&mut self) -> Option<&mut EntityValues> {
        self.values.as_mut()
    }

    /// Consumes the handle and returns its values.
    #[must_use]
    pub fn into_values(self) -> Option<EntityValues> {
        self.values
    }

    /// Returns a single property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.as_ref().and_then(|v| v.get(key))
    }

    /// Returns a property value as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Sets the entity values, filling in the structural properties.
    ///
    /// `annal:id`, `annal:type_id` and `annal:type` keep any supplied value;
    /// `annal:url` defaults to the view URL path.
    pub fn set_values(&mut self, values: EntityValues) {
        let mut values = values;
        values
            .entry(annal::ID)
            .or_insert_with(|| Value::String(self.id.clone()));
        values
            .entry(annal::TYPE_ID)
            .or_insert_with(|| Value::String(self.kind.type_id().to_string()));
        values
            .entry(annal::TYPE)
            .or_insert_with(|| Value::String(self.kind.type_uri().to_string()));
        if !values.contains_key(annal::URL) {
            values.insert(annal::URL.to_string(), Value::String(self.view_url_path()));
        }
        self.values = Some(values);
    }

    /// Returns the `(path, message)` of a body that failed to parse.
    #[must_use]
    pub fn error(&self) -> Option<(&str, &str)> {
        let path = self.get_str(jsonld::ERROR)?;
        Some((path, self.get_str(jsonld::MESSAGE).unwrap_or("")))
    }

    /// Returns the label, falling back to the entity id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.get_str(rdfs::LABEL).unwrap_or(&self.id)
    }

    /// Returns the entity URI: an explicit `annal:uri`, else its URL.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.get_str(annal::URI)
            .filter(|u| !u.is_empty())
            .or_else(|| self.get_str(annal::URL))
    }

    /// Returns the stored `@type` list.
    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        match self.get(jsonld::TYPE) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(t)) => vec![t.as_str()],
            _ => Vec::new(),
        }
    }

    /// Enumerates `(path, value)` pairs, recursing into arrays of objects.
    ///
    /// Arrays whose elements are all objects are the storage form of
    /// repeated field groups; their members are reported individually.
    #[must_use]
    pub fn enum_fields(&self) -> Vec<(Vec<PathSegment>, Value)> {
        fn walk(prefix: &[PathSegment], map: &EntityValues, out: &mut Vec<(Vec<PathSegment>, Value)>) {
            for (key, value) in map {
                let mut path = prefix.to_vec();
                path.push(PathSegment::Key(key.clone()));
                match value {
                    Value::Array(items) if items.iter().all(Value::is_object) => {
                        for (i, item) in items.iter().enumerate() {
                            if let Value::Object(inner) = item {
                                let mut item_path = path.clone();
                                item_path.push(PathSegment::Index(i));
                                walk(&item_path, inner, out);
                            }
                        }
                    }
                    other => out.push((path, other.clone())),
                }
            }
        }

        let mut out = Vec::new();
        if let Some(values) = &self.values {
            walk(&[], values, &mut out);
        }
        out
    }

    /// Returns the value at a path produced by [`Entity::enum_fields`].
    #[must_use]
    pub fn get_field(&self, path: &[PathSegment]) -> Option<&Value> {
        let mut segments = path.iter();
        let first = match segments.next()? {
            PathSegment::Key(k) => self.get(k)?,
            PathSegment::Index(_) => return None,
        };
        segments.try_fold(first, |value, seg| match seg {
            PathSegment::Key(k) => value.get(k.as_str()),
            PathSegment::Index(i) => value.get(*i),
        })
    }

    // Storage

    fn resolve(&self, scope: Scope) -> Option<Resolved> {
        let def = self.kind.def();
        let probe = |dir: &Path, origin: Origin| -> Option<Resolved> {
            if !dir.is_dir() {
                return None;
            }
            let body = dir.join(def.body_file);
            if body.is_file() || self.kind.exists_by_dir() {
                return Some(Resolved {
                    origin,
                    dir: dir.to_path_buf(),
                    body,
                });
            }
            def.legacy_body_files
                .iter()
                .map(|name| dir.join(name))
                .find(|old| old.is_file())
                .map(|old| Resolved {
                    origin: Origin::Legacy,
                    dir: dir.to_path_buf(),
                    body: old,
                })
        };

        if scope.includes_local() {
            if let Some(found) = probe(&self.primary.dir, Origin::Primary) {
                return Some(found);
            }
            if let Some(legacy) = &self.legacy_dir {
                if let Some(found) = probe(legacy, Origin::Legacy) {
                    return Some(Resolved {
                        origin: Origin::Legacy,
                        ..found
                    });
                }
            }
        }
        if scope.includes_alt(&self.kind) {
            if let Some(alt) = &self.alt {
                if let Some(found) = probe(&alt.dir, Origin::Alt) {
                    // A legacy body name at the alternate location is still an alternate hit.
                    return Some(Resolved {
                        origin: Origin::Alt,
                        ..found
                    });
                }
            }
        }
        None
    }

    /// Tests whether the entity exists within `scope`.
    #[must_use]
    pub fn exists(&self, scope: Scope) -> bool {
        self.resolve(scope).is_some()
    }

    fn read_values(&self, resolved: &Resolved) -> StoreResult<Option<EntityValues>> {
        if self.kind.exists_by_dir() && !resolved.body.is_file() {
            let mut values = EntityValues::new();
            values.insert(jsonld::TYPE.to_string(), json!([self.kind.type_uri()]));
            return Ok(Some(values));
        }
        match read_json(&resolved.body) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Ok(Some(Self::error_values(&resolved.body, "entity body is not a JSON object"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %resolved.body.display(), "entity body vanished before read");
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(path = %resolved.body.display(), error = %e, "error loading entity values");
                Ok(Some(Self::error_values(&resolved.body, &e.to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn error_values(path: &Path, detail: &str) -> EntityValues {
        let mut values = EntityValues::new();
        values.insert(jsonld::ERROR.to_string(), Value::String(path.display().to_string()));
        values.insert(
            jsonld::MESSAGE.to_string(),
            Value::String(format!("Error loading entity values: {detail}")),
        );
        values
    }

    /// Reads this entity's values from storage.
    ///
    /// Returns `Ok(None)` if the entity does not exist within `scope`. A body
    /// that fails to parse still loads, carrying `@error` and `@message`
    /// (see [`Entity::error`]).
    pub fn load(mut self, scope: Scope) -> StoreResult<Option<Self>> {
        let Some(resolved) = self.resolve(scope) else {
            debug!(kind = %self.kind, id = %self.id, %scope, "entity not found");
            return Ok(None);
        };
        let Some(values) = self.read_values(&resolved)? else {
            return Ok(None);
        };
        debug!(kind = %self.kind, id = %self.id, path = %resolved.body.display(), "loaded entity");

        self.origin = Some(resolved.origin);
        self.found_dir = Some(resolved.dir);
        self.accept_loaded(values);
        Ok(Some(self))
    }

    fn accept_loaded(&mut self, mut values: EntityValues) {
        if values.contains_key(jsonld::ERROR) {
            self.values = Some(values);
            return;
        }
        values.insert(annal::URL.to_string(), Value::String(self.view_url_path()));
        let values = crate::model::migrate::migrate_values(&self.kind, values);
        self.set_values(values);
    }

    fn stored_types(&self, values: &EntityValues) -> Value {
        let mut types: Vec<Value> = match values.get(jsonld::TYPE) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        };
        let type_uri = Value::String(self.kind.type_uri().to_string());
        if !types.contains(&type_uri) {
            types.push(type_uri);
        }
        Value::Array(types)
    }

    fn migrate_legacy_location(&self) -> StoreResult<()> {
        if self.primary.dir.is_dir() {
            return Ok(());
        }
        if let Some(legacy) = &self.legacy_dir {
            if legacy.is_dir() {
                if let Some(parent) = self.primary.dir.parent() {
                    fs::create_dir_all(parent)?;
                }
                info!(from = %legacy.display(), to = %self.primary.dir.display(), "migrating entity directory");
                fs::rename(legacy, &self.primary.dir)?;
            }
        }
        Ok(())
    }

    /// Writes the entity body to its primary location.
    ///
    /// The stored record gets `@id`, `@type` (including the kind's type URI),
    /// `@context` and `annal:id`; `annal:url` is dropped. A copy read from a
    /// legacy location is moved to the current layout first.
    ///
    /// # Errors
    /// `InvariantViolated` if the body would land outside the site tree.
    pub fn save(&mut self) -> StoreResult<()> {
        let Some(values) = &self.values else {
            return Err(StoreError::internal(format!(
                "save of {} {} without values",
                self.kind, self.id
            )));
        };
        let body = self.body_path();
        if !is_within(&body, &self.site_root) {
            error!(path = %body.display(), root = %self.site_root.display(), "refusing to write outside site tree");
            return Err(StoreError::invariant(format!(
                "attempt to create entity file outside site tree ({})",
                body.display()
            )));
        }

        if self.origin == Some(Origin::Legacy) {
            self.migrate_legacy_location()?;
        }

        let def = self.kind.def();
        let self_ref = def.self_ref;
        let types = self.stored_types(values);
        let mut stored = values.clone();
        stored.insert(jsonld::ID.to_string(), Value::String(self_ref.to_string()));
        stored.insert(jsonld::TYPE.to_string(), types.clone());
        stored.insert(
            jsonld::CONTEXT.to_string(),
            json!([{ jsonld::BASE: def.base_ref }, def.context_ref]),
        );
        stored.insert(annal::ID.to_string(), Value::String(self.id.clone()));
        stored.remove(annal::URL);

        write_json_atomic(&body, &Value::Object(stored))?;
        debug!(kind = %self.kind, id = %self.id, path = %body.display(), "saved entity");

        for old in def.legacy_body_files {
            let old_path = self.primary.dir.join(old);
            if old_path.is_file() {
                info!(path = %old_path.display(), "removing superseded body file");
                fs::remove_file(&old_path)?;
            }
        }
        if let Some(prov_file) = def.prov_file {
            let prov = json!({
                jsonld::ID: self_ref,
                annal::ID: self.id,
                annal::TYPE_ID: self.kind.type_id(),
                prov::GENERATED_AT_TIME: Utc::now().to_rfc3339(),
            });
            write_json_atomic(&self.primary.dir.join(prov_file), &prov)?;
        }
        if let Some(values) = self.values.as_mut() {
            values.insert(jsonld::TYPE.to_string(), types);
        }
        self.origin = Some(Origin::Primary);
        self.found_dir = Some(self.primary.dir.clone());
        Ok(())
    }

    // Children

    /// Creates (or overwrites) a child entity with the supplied values.
    pub fn create_child(&self, kind: Kind, id: &str, values: EntityValues) -> StoreResult<Self> {
        let mut child = self.child(kind, id)?;
        child.set_values(values);
        child.save()?;
        Ok(child)
    }

    /// Creates a child entity, failing if one already exists locally.
    ///
    /// # Errors
    /// `AlreadyExists` if the child exists at its primary location.
    pub fn create_new_child(&self, kind: Kind, id: &str, values: EntityValues) -> StoreResult<Self> {
        let child = self.child(kind, id)?;
        if child.exists(Scope::Coll) {
            return Err(StoreError::already_exists(child.type_id(), id));
        }
        self.create_child(child.kind, id, values)
    }

    /// Loads a child entity; an invalid id is reported as absent.
    pub fn load_child(&self, kind: Kind, id: &str, scope: Scope) -> StoreResult<Option<Self>> {
        match self.child(kind, id) {
            Ok(child) => child.load(scope),
            Err(e) if e.is_invalid_id() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tests whether a child exists within `scope`.
    #[must_use]
    pub fn child_exists(&self, kind: Kind, id: &str, scope: Scope) -> bool {
        self.child(kind, id).is_ok_and(|c| c.exists(scope))
    }

    /// Removes a collection-local child and everything beneath it.
    ///
    /// # Errors
    /// - `NotFound` if the child is not present locally (site overlay
    ///   entries are never removed through a collection).
    /// - `TypeMismatch` if its stored `@type` lacks the kind's type URI.
    /// - `InvariantViolated` if its directory is not beneath this entity.
    pub fn remove_child(&self, kind: Kind, id: &str) -> StoreResult<()> {
        let Some(child) = self.load_child(kind.clone(), id, Scope::Coll)? else {
            return Err(StoreError::not_found(kind.type_id(), id));
        };
        let type_uri = child.kind.type_uri();
        let found: Vec<String> = child.types().into_iter().map(str::to_string).collect();
        if !found.iter().any(|t| t == type_uri) {
            error!(id, expected = type_uri, ?found, "refusing to remove entity of unexpected type");
            return Err(ExecutionError::TypeMismatch {
                id: id.to_string(),
                expected: type_uri.to_string(),
                found,
            }
            .into());
        }
        let dir = child.dir_in_use();
        if !is_within(dir, &self.primary.dir) || dir == self.primary.dir {
            error!(dir = %dir.display(), parent = %self.primary.dir.display(), "refusing to remove entity outside parent");
            return Err(StoreError::invariant(format!(
                "entity {id} directory {} is not beneath {}",
                dir.display(),
                self.primary.dir.display()
            )));
        }
        info!(kind = %child.kind, id, dir = %dir.display(), "removing entity");
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    /// Returns a fresh zero-padded numeric id not currently used by a local or overlay child.
    ///
    /// # Errors
    /// `Internal` if no free id is found within `max_attempts` candidates.
    pub fn allocate_new_id(&self, kind: &Kind, max_attempts: u32) -> StoreResult<String> {
        for n in 1..=max_attempts {
            let candidate = format!("{n:0width$}", width = NEW_ID_WIDTH);
            if !self.child_exists(kind.clone(), &candidate, Scope::All) {
                return Ok(candidate);
            }
        }
        Err(StoreError::internal(format!(
            "no free {kind} id within {max_attempts} attempts"
        )))
    }

    fn candidate_ids(dir: &Path, seen: &mut Vec<String>) -> StoreResult<()> {
        for name in list_dir(dir)? {
            if name != INITIAL_VALUES_ID && valid_id(&name, false) && !seen.contains(&name) {
                seen.push(name);
            }
        }
        Ok(())
    }

    /// Enumerates ids of existing children of `kind` within `scope`.
    ///
    /// Local children come first, then overlay children not already listed.
    /// Reserved names and the initial-values template are never listed.
    pub fn child_ids(&self, kind: &Kind, scope: Scope) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        if scope.includes_local() {
            Self::candidate_ids(&self.primary.dir.join(kind.children_relpath()), &mut ids)?;
            if let Some(rel) = kind.legacy_children_relpath() {
                Self::candidate_ids(&self.primary.dir.join(rel), &mut ids)?;
            }
        }
        if scope.includes_alt(kind) {
            if let (Some(alt), Some(rel)) = (&self.alt, kind.alt_children_relpath()) {
                Self::candidate_ids(&alt.dir.join(rel), &mut ids)?;
            }
        }
        ids.retain(|id| self.child_exists(kind.clone(), id, scope));
        Ok(ids)
    }

    /// Loads every child of `kind` within `scope`.
    pub fn children(&self, kind: &Kind, scope: Scope) -> StoreResult<Vec<Self>> {
        let mut out = Vec::new();
        for id in self.child_ids(kind, scope)? {
            if let Some(child) = self.load_child(kind.clone(), &id, scope)? {
                out.push(child);
            }
        }
        Ok(out)
    }

    /// Moves a local child to a new id, keeping its attachments.
    ///
    /// The moved body is rewritten so `annal:id` and `@id` match the new id.
    ///
    /// # Errors
    /// `NotFound` if the source is absent locally, `AlreadyExists` if the
    /// target exists, `InvariantViolated` if either directory is outside
    /// this entity.
    pub fn rename_child(&self, kind: &Kind, old_id: &str, new_id: &str) -> StoreResult<Self> {
        let Some(mut old) = self.load_child(kind.clone(), old_id, Scope::Coll)? else {
            return Err(StoreError::not_found(kind.type_id(), old_id));
        };
        let new = self.child(kind.clone(), new_id)?;
        if new.exists(Scope::Coll) || new.primary.dir.exists() {
            return Err(StoreError::already_exists(kind.type_id(), new_id));
        }
        if old.origin == Some(Origin::Legacy) {
            old.save()?;
        }
        for dir in [&old.primary.dir, &new.primary.dir] {
            if !is_within(dir, &self.primary.dir) || dir == &self.primary.dir {
                error!(dir = %dir.display(), parent = %self.primary.dir.display(), "refusing to rename outside parent");
                return Err(StoreError::invariant(format!(
                    "rename path {} is not beneath {}",
                    dir.display(),
                    self.primary.dir.display()
                )));
            }
        }
        if let Some(parent) = new.primary.dir.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(kind = %kind, from = old_id, to = new_id, "renaming entity");
        fs::rename(&old.primary.dir, &new.primary.dir)?;

        let Some(mut renamed) = new.load(Scope::Coll)? else {
            return Err(StoreError::internal(format!("renamed entity {new_id} not readable")));
        };
        let url_path = renamed.view_url_path();
        if let Some(values) = renamed.values.as_mut() {
            values.insert(annal::ID.to_string(), Value::String(new_id.to_string()));
            values.insert(annal::URL.to_string(), Value::String(url_path));
        }
        renamed.save()?;
        Ok(renamed)
    }

    // Attached files

    /// Lists files stored with the entity, excluding its body and provenance.
    pub fn attachments(&self) -> StoreResult<Vec<String>> {
        let def = self.kind.def();
        let dir = self.dir_in_use();
        let mut names = Vec::new();
        for name in list_dir(dir)? {
            let reserved = name == def.body_file
                || Some(name.as_str()) == def.prov_file
                || def.legacy_body_files.contains(&name.as_str());
            if !reserved && !name.starts_with('.') && dir.join(&name).is_file() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Returns the path of a file stored with the entity, if it exists.
    #[must_use]
    pub fn resource_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return None;
        }
        let path = self.dir_in_use().join(name);
        path.is_file().then_some(path)
    }

    /// Opens a file stored with the entity for reading.
    pub fn resource_file(&self, name: &str) -> StoreResult<Option<File>> {
        match self.resource_path(name) {
            Some(path) => Ok(Some(File::open(path)?)),
            None => Ok(None),
        }
    }

    /// Creates (or truncates) a file stored with the entity at its primary location.
    ///
    /// # Errors
    /// `InvalidValue` for names that would escape the entity directory.
    pub fn create_resource(&self, name: &str) -> StoreResult<File> {
        let path = self.primary.dir.join(name);
        if name.is_empty() || !is_within(&path, &self.primary.dir) || path == self.primary.dir {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "resource_name".to_string(),
                reason: format!("'{name}' is not a file within the entity"),
            }
            .into());
        }
        fs::create_dir_all(&self.primary.dir)?;
        Ok(File::create(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn site(root: &Path) -> Entity {
        let dir = root.join("annalist_site");
        Entity::root(Kind::Site, "site", dir.clone(), "/annalist/", dir)
    }

    fn coll(site: &Entity, id: &str) -> Entity {
        let mut c = site.child(Kind::Collection, id).unwrap();
        if id != SITE_DATA_ID {
            let data = site.child(Kind::Collection, SITE_DATA_ID).unwrap();
            c = c.with_alt(data.location().clone());
        }
        c
    }

    fn vals(pairs: &[(&str, &str)]) -> EntityValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    #[test]
    fn test_child_locations() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        assert_eq!(c.url(), "/annalist/c/testcoll/");
        assert_eq!(c.owner_id(), "testcoll");

        let t = c.child(Kind::Type, "t1").unwrap();
        assert_eq!(t.dir(), dir.path().join("annalist_site/c/testcoll/d/_type/t1"));
        assert_eq!(t.url(), "/annalist/c/testcoll/d/_type/t1/");
        assert_eq!(t.alt().unwrap().dir, dir.path().join("annalist_site/c/_annalist_site/d/_type/t1"));
        assert_eq!(t.alt().unwrap().owner, SITE_DATA_ID);
        assert_eq!(t.type_entity_id(), "_type/t1");
    }

    #[test]
    fn test_child_rejects_invalid_id() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        assert!(c.child(Kind::Type, "bad/id").unwrap_err().is_invalid_id());
        assert!(c.child(Kind::Type, "_annalist_site").unwrap_err().is_invalid_id());
        assert!(site.child(Kind::Collection, SITE_DATA_ID).is_ok());
    }

    #[test]
    fn test_create_and_load_entity_data() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let td = c.create_child(Kind::TypeData, "t1", EntityValues::new()).unwrap();

        td.create_child(Kind::EntityData("t1".into()), "e1", vals(&[(rdfs::LABEL, "Hello")]))
            .unwrap();

        let e = td
            .load_child(Kind::EntityData("t1".into()), "e1", Scope::Coll)
            .unwrap()
            .unwrap();
        assert_eq!(e.origin(), Some(Origin::Primary));
        assert_eq!(e.get_str(annal::ID), Some("e1"));
        assert_eq!(e.get_str(annal::TYPE_ID), Some("t1"));
        assert_eq!(e.get_str(rdfs::LABEL), Some("Hello"));
        assert_eq!(e.get_str(jsonld::ID), Some("../"));
        assert_eq!(e.types(), vec!["annal:EntityData"]);
        assert_eq!(e.get_str(annal::URL), Some("/annalist/c/testcoll/d/t1/e1/"));
        assert_eq!(e.label(), "Hello");

        // provenance written alongside
        assert!(e.dir().join("entity_prov.jsonld").is_file());
        // url is never stored
        let raw = read_json(&e.body_path()).unwrap();
        assert!(raw.get(annal::URL).is_none());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        assert!(c.load_child(Kind::Type, "nothere", Scope::All).unwrap().is_none());
        assert!(c.load_child(Kind::Type, "bad id", Scope::All).unwrap().is_none());
        assert!(!c.child_exists(Kind::Type, "nothere", Scope::All));
    }

    #[test]
    fn test_malformed_body_loads_as_error_record() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let t = c.child(Kind::Type, "broken").unwrap();
        fs::create_dir_all(t.dir()).unwrap();
        fs::write(t.body_path(), "{ not json").unwrap();

        let loaded = c.load_child(Kind::Type, "broken", Scope::Coll).unwrap().unwrap();
        let (path, message) = loaded.error().unwrap();
        assert!(path.ends_with("type_meta.jsonld"));
        assert!(message.starts_with("Error loading entity values"));
    }

    #[test]
    fn test_alt_parent_lookup() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let sitedata = coll(&site, SITE_DATA_ID);
        sitedata
            .create_child(Kind::Type, "_sitetype", vals(&[(rdfs::LABEL, "Site type")]))
            .unwrap();
        let c = coll(&site, "testcoll");

        assert!(!c.child_exists(Kind::Type, "_sitetype", Scope::Coll));
        assert!(c.child_exists(Kind::Type, "_sitetype", Scope::All));
        let t = c.load_child(Kind::Type, "_sitetype", Scope::All).unwrap().unwrap();
        assert_eq!(t.origin(), Some(Origin::Alt));
        assert_eq!(t.owner_id(), SITE_DATA_ID);
        assert_eq!(t.url_in_use(), "/annalist/c/_annalist_site/d/_type/_sitetype/");
        // primary URL and view URL stay collection-relative
        assert_eq!(t.url(), "/annalist/c/testcoll/d/_type/_sitetype/");
        assert_eq!(t.get_str(annal::URL), Some("/annalist/c/testcoll/d/_type/_sitetype/"));
    }

    #[test]
    fn test_save_after_alt_load_writes_collection_copy() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let sitedata = coll(&site, SITE_DATA_ID);
        sitedata.create_child(Kind::View, "Default_view", EntityValues::new()).unwrap();
        let c = coll(&site, "testcoll");

        let mut v = c.load_child(Kind::View, "Default_view", Scope::All).unwrap().unwrap();
        v.values_mut()
            .unwrap()
            .insert(rdfs::LABEL.to_string(), json!("Local"));
        v.save().unwrap();

        assert!(c.child_exists(Kind::View, "Default_view", Scope::Coll));
        let site_copy = sitedata
            .load_child(Kind::View, "Default_view", Scope::Coll)
            .unwrap()
            .unwrap();
        assert!(site_copy.get(rdfs::LABEL).is_none());
    }

    #[test]
    fn test_child_ids_union_without_duplicates() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let sitedata = coll(&site, SITE_DATA_ID);
        for id in ["Default_list", "_initial_values", "Shared"] {
            sitedata.create_child(Kind::List, id, EntityValues::new()).unwrap();
        }
        let c = coll(&site, "testcoll");
        for id in ["Shared", "Local"] {
            c.create_child(Kind::List, id, EntityValues::new()).unwrap();
        }

        let coll_ids = c.child_ids(&Kind::List, Scope::Coll).unwrap();
        assert_eq!(coll_ids, vec!["Local".to_string(), "Shared".to_string()]);
        let all_ids = c.child_ids(&Kind::List, Scope::All).unwrap();
        assert_eq!(
            all_ids,
            vec!["Local".to_string(), "Shared".to_string(), "Default_list".to_string()]
        );
        let site_ids = c.child_ids(&Kind::List, Scope::Site).unwrap();
        assert_eq!(site_ids, vec!["Default_list".to_string(), "Shared".to_string()]);
    }

    #[test]
    fn test_remove_child() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        c.create_child(Kind::Field, "f1", EntityValues::new()).unwrap();

        c.remove_child(Kind::Field, "f1").unwrap();
        assert!(!c.child_exists(Kind::Field, "f1", Scope::Coll));
        assert!(c.remove_child(Kind::Field, "f1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_refuses_type_mismatch() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let f = c.child(Kind::Field, "odd").unwrap();
        write_json_atomic(&f.body_path(), &json!({"@type": ["annal:View"]})).unwrap();

        let err = c.remove_child(Kind::Field, "odd").unwrap_err();
        assert!(err.is_type_mismatch());
        assert!(f.body_path().is_file());
    }

    #[test]
    fn test_remove_ignores_site_overlay() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let sitedata = coll(&site, SITE_DATA_ID);
        sitedata.create_child(Kind::Type, "_builtin", EntityValues::new()).unwrap();
        let c = coll(&site, "testcoll");

        let err = c.remove_child(Kind::Type, "_builtin").unwrap_err();
        assert!(err.is_not_found());
        assert!(c.child_exists(Kind::Type, "_builtin", Scope::All));
    }

    #[test]
    fn test_save_outside_site_tree_is_refused() {
        let dir = tempdir().unwrap();
        let inner = dir.path().join("inner");
        let outside = Entity::root(Kind::Site, "s", dir.path().join("elsewhere"), "/", inner);
        let mut c = outside.child(Kind::Collection, "c1").unwrap();
        c.set_values(EntityValues::new());
        assert!(c.save().unwrap_err().is_invariant_violated());
    }

    #[test]
    fn test_allocate_new_id() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let td = c.create_child(Kind::TypeData, "t1", EntityValues::new()).unwrap();
        let kind = Kind::EntityData("t1".into());

        assert_eq!(td.allocate_new_id(&kind, 10).unwrap(), "00000001");
        td.create_child(kind.clone(), "00000001", EntityValues::new()).unwrap();
        td.create_child(kind.clone(), "00000002", EntityValues::new()).unwrap();
        assert_eq!(td.allocate_new_id(&kind, 10).unwrap(), "00000003");
        assert!(td.allocate_new_id(&kind, 2).unwrap_err().is_internal());
    }

    #[test]
    fn test_create_new_child_already_exists() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        c.create_new_child(Kind::Group, "g1", EntityValues::new()).unwrap();
        let err = c.create_new_child(Kind::Group, "g1", EntityValues::new()).unwrap_err();
        assert!(err.is_already_exists());
        // plain create overwrites
        c.create_child(Kind::Group, "g1", vals(&[(rdfs::LABEL, "again")])).unwrap();
    }

    #[test]
    fn test_legacy_body_file_migrates_on_save() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let td = c.create_child(Kind::TypeData, "t1", EntityValues::new()).unwrap();
        let e = td.child(Kind::EntityData("t1".into()), "old").unwrap();
        fs::create_dir_all(e.dir()).unwrap();
        fs::write(e.dir().join("entity-data.jsonld"), r#"{"rdfs:label": "legacy"}"#).unwrap();

        let mut loaded = td
            .load_child(Kind::EntityData("t1".into()), "old", Scope::Coll)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.origin(), Some(Origin::Legacy));
        assert_eq!(loaded.label(), "legacy");

        loaded.save().unwrap();
        assert!(e.body_path().is_file());
        assert!(!e.dir().join("entity-data.jsonld").exists());
    }

    #[test]
    fn test_legacy_directory_migrates_on_save() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let legacy = c.dir().join("_annalist_collection/types/old_t");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("type_meta.jsonld"), r#"{"rdfs:label": "Old type"}"#).unwrap();

        let mut t = c.load_child(Kind::Type, "old_t", Scope::Coll).unwrap().unwrap();
        assert_eq!(t.origin(), Some(Origin::Legacy));
        t.save().unwrap();
        assert!(c.dir().join("d/_type/old_t/type_meta.jsonld").is_file());
        assert!(!legacy.exists());
    }

    #[test]
    fn test_rename_child_keeps_attachments() {
        let dir = tempdir().unwrap();
        let site = site(dir.path());
        let c = coll(&site, "testcoll");
        let td = c.create_child(Kind::TypeData, "t1", EntityValues::new()).unwrap();
        let kind = Kind::EntityData("t1".into());
        let e = td.create_child(kind.clone(), "e1", vals(&[(rdfs::LABEL, "one")])).unwrap();
        e.create_resource("image.png").unwrap().write_all(b"png").unwrap();

        let renamed = td.rename_child(&kind, "e1", "e2").unwrap();
        assert_eq!(renamed.get_str(annal::ID), Some("e2"));
        assert_eq!(renamed.label(), "one");
        assert_eq!(renamed.attachments().unwrap(), vec!["image.png".to_string()]);
        assert!(!td.child_exists(kind.clone(), "e1", Scope::Coll));

        td.create_child(kind.clone(), "e3", EntityValues::new()).unwrap();
        assert!(td.rename_child(&kind, "e2", "e3").unwrap_err().is_already_exists());
        assert!(td.rename_child(&kind, "nope", "e9").unwrap_err().is_not_found());
    }

    #[test]
    fn test_enum_fields_and_get_field() {
        let mut e = Entity::root(Kind::Site, "s", PathBuf::from("/x"), "/", PathBuf::from("/x"));
        let values = json!({
            "p:a": "1",
            "p:list": [{"q:x": "10"}, {"q:x": "20", "q:y": "21"}],
            "p:plain": ["a", "b"],
            "p:empty": []
        });
        let Value::Object(map) = values else { unreachable!() };
        e.values = Some(map);

        let fields = e.enum_fields();
        let paths: Vec<_> = fields.iter().map(|(p, _)| p.clone()).collect();
        assert!(paths.contains(&vec![PathSegment::Key("p:a".into())]));
        assert!(paths.contains(&vec![
            PathSegment::Key("p:list".into()),
            PathSegment::Index(1),
            PathSegment::Key("q:y".into())
        ]));
        assert!(paths.contains(&vec![PathSegment::Key("p:plain".into())]));
        assert!(!paths.iter().any(|p| p.first() == Some(&PathSegment::Key("p:empty".into()))));

        for (path, value) in &fields {
            assert_eq!(e.get_field(path), Some(value));
        }
    }

    #[test]
    fn test_uri_prefers_explicit() {
        let mut e = Entity::root(Kind::Site, "s", PathBuf::from("/x"), "/", PathBuf::from("/x"));
        e.set_values(vals(&[(annal::URI, "http://example.org/thing")]));
        assert_eq!(e.uri(), Some("http://example.org/thing"));
        e.set_values(vals(&[(annal::URI, "")]));
        assert_eq!(e.uri(), Some("/"));
    }
}
