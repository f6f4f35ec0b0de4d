//! Collections: the unit of user data, types and views.
//!
//! Every lookup goes through the site's entity caches, so entities of a
//! collection are read from disk once and then served from memory until a
//! mutation through this handle (or an explicit flush) invalidates them.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cache::CollectionEntityCache;
use crate::entity::{Entity, EntityValues, Kind, Scope};
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::field::renderer::field_jsonld_context;
use crate::layout::{COLL_CONTEXT_FILE, SITE_DATA_ID};
use crate::util::ident::extract_entity_id;
use crate::util::paths::write_json_atomic;
use crate::vocab::{self, annal, jsonld, rdfs};

use super::record_type::RecordType;
use super::site::Site;
use super::type_info::TypeInfo;

/// Type ids whose records feed the generated JSON-LD context.
const CONTEXT_TYPE_IDS: &[&str] = &["_view", "_field", "_group", "_vocab"];

/// Permissions given to a user record when none are supplied.
pub const DEFAULT_USER_PERMISSIONS: &[&str] = &["VIEW"];

/// An open collection.
#[derive(Debug, Clone)]
pub struct Collection {
    site: Site,
    entity: Entity,
}

impl Collection {
    pub(crate) fn new(site: Site, entity: Entity) -> Self {
        Self { site, entity }
    }

    /// Returns the site this collection belongs to.
    #[must_use]
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Returns the collection entity handle.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Returns the collection id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.entity.id()
    }

    /// Returns the collection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.entity.url()
    }

    /// Returns the collection directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.entity.dir()
    }

    /// Returns the collection description values.
    #[must_use]
    pub fn values(&self) -> Option<&EntityValues> {
        self.entity.values()
    }

    /// Returns true for the site data collection.
    #[must_use]
    pub fn is_site_data(&self) -> bool {
        self.id() == SITE_DATA_ID
    }

    // Parents and caches

    /// Returns the entity under which records of `type_id` are stored.
    ///
    /// Metadata records live directly under the collection; user data lives
    /// under a per-type container.
    pub fn parent_for(&self, type_id: &str) -> StoreResult<Entity> {
        let kind = Kind::for_type_id(type_id);
        if kind.is_metadata() {
            Ok(self.entity.clone())
        } else {
            self.entity.child(Kind::TypeData, type_id)
        }
    }

    fn cache(&self, type_id: &str) -> StoreResult<Arc<CollectionEntityCache>> {
        self.site.caches().for_type(type_id)
    }

    fn after_change(&self, type_id: &str) -> StoreResult<()> {
        if CONTEXT_TYPE_IDS.contains(&type_id) {
            self.generate_context()?;
        }
        Ok(())
    }

    // Generic entity access

    /// Returns an entity, consulting the site overlay when `scope` allows.
    pub fn get_entity(&self, type_id: &str, id: &str, scope: Scope) -> StoreResult<Option<Entity>> {
        let parent = match self.parent_for(type_id) {
            Ok(p) => p,
            Err(e) if e.is_invalid_id() => return Ok(None),
            Err(e) => return Err(e),
        };
        let kind = Kind::for_type_id(type_id);
        self.cache(type_id)?.get_entity(&parent, &kind, id, scope)
    }

    /// Returns the entity of `type_id` whose URI is `uri`.
    pub fn get_entity_from_uri(&self, type_id: &str, uri: &str, scope: Scope) -> StoreResult<Option<Entity>> {
        let parent = self.parent_for(type_id)?;
        let kind = Kind::for_type_id(type_id);
        self.cache(type_id)?.get_entity_from_uri(&parent, &kind, uri, scope)
    }

    /// Tests whether an entity exists within `scope`.
    pub fn entity_exists(&self, type_id: &str, id: &str, scope: Scope) -> StoreResult<bool> {
        Ok(self.get_entity(type_id, id, scope)?.is_some())
    }

    /// Returns the ids of entities of `type_id` visible within `scope`.
    pub fn entity_ids(&self, type_id: &str, scope: Scope) -> StoreResult<Vec<String>> {
        let parent = self.parent_for(type_id)?;
        let kind = Kind::for_type_id(type_id);
        self.cache(type_id)?.get_entity_ids(&parent, &kind, scope)
    }

    /// Returns the entities of `type_id` visible within `scope`.
    pub fn entities(&self, type_id: &str, scope: Scope) -> StoreResult<Vec<Entity>> {
        let parent = self.parent_for(type_id)?;
        let kind = Kind::for_type_id(type_id);
        self.cache(type_id)?.get_entities(&parent, &kind, scope)
    }

    /// Creates or overwrites an entity in this collection.
    pub fn add_entity(&self, type_id: &str, id: &str, values: EntityValues) -> StoreResult<Entity> {
        let parent = self.parent_for(type_id)?;
        let entity = parent.create_child(Kind::for_type_id(type_id), id, values)?;
        self.cache(type_id)?.set_entity(&entity)?;
        debug!(coll_id = self.id(), type_id, id, "added entity");
        self.after_change(type_id)?;
        Ok(entity)
    }

    /// Creates an entity, failing if the id is already used in this collection.
    ///
    /// # Errors
    /// `AlreadyExists` if the entity exists locally.
    pub fn add_new_entity(&self, type_id: &str, id: &str, values: EntityValues) -> StoreResult<Entity> {
        if self.entity_exists(type_id, id, Scope::Coll)? {
            return Err(StoreError::already_exists(type_id, id));
        }
        self.add_entity(type_id, id, values)
    }

    /// Saves a (possibly modified) entity handle obtained from this collection.
    ///
    /// An entity read from the site overlay is written to this collection.
    pub fn save_entity(&self, entity: &mut Entity) -> StoreResult<()> {
        entity.save()?;
        let type_id = entity.type_id().to_string();
        self.cache(&type_id)?.set_entity(entity)?;
        self.after_change(&type_id)
    }

    /// Removes a collection-local entity.
    ///
    /// # Errors
    /// `NotFound` when the entity is absent here (including entities that
    /// exist only in the site overlay), `TypeMismatch` when its stored type
    /// disagrees with `type_id`.
    pub fn remove_entity(&self, type_id: &str, id: &str) -> StoreResult<()> {
        let parent = self.parent_for(type_id)?;
        parent.remove_child(Kind::for_type_id(type_id), id)?;
        self.cache(type_id)?.remove_entity(self.id(), id)?;
        self.after_change(type_id)
    }

    /// Allocates an unused numeric id for a new entity of `type_id`.
    pub fn allocate_new_id(&self, type_id: &str) -> StoreResult<String> {
        let parent = self.parent_for(type_id)?;
        parent.allocate_new_id(&Kind::for_type_id(type_id), self.site.config().max_id_attempts)
    }

    // Rename

    /// Renames an entity, keeping its values and attachments.
    ///
    /// Renaming a `_type` record also moves the type's data, updates every
    /// instance and rewrites `/d/<old>/` references in local views and lists.
    ///
    /// # Errors
    /// `NotFound` if the source is absent locally, `AlreadyExists` if the
    /// target exists, `InvalidValue` when renaming a built-in type.
    pub fn rename_entity(&self, type_id: &str, old_id: &str, new_id: &str) -> StoreResult<Entity> {
        if type_id == "_type" {
            return self.rename_type(old_id, new_id);
        }
        let parent = self.parent_for(type_id)?;
        let renamed = parent.rename_child(&Kind::for_type_id(type_id), old_id, new_id)?;
        let cache = self.cache(type_id)?;
        cache.remove_entity(self.id(), old_id)?;
        cache.set_entity(&renamed)?;
        info!(coll_id = self.id(), type_id, old_id, new_id, "renamed entity");
        self.after_change(type_id)?;
        Ok(renamed)
    }

    fn rename_type(&self, old_id: &str, new_id: &str) -> StoreResult<Entity> {
        if old_id.starts_with('_') || new_id.starts_with('_') {
            warn!(old_id, new_id, "refusing to rename a built-in type");
            return Err(ValidationError::InvalidValue {
                field: "type_id".to_string(),
                reason: format!("built-in type '{old_id}' cannot be renamed to '{new_id}'"),
            }
            .into());
        }
        let old_type = self.entity.load_child(Kind::Type, old_id, Scope::Coll)?;
        let old_type_url = old_type
            .as_ref()
            .and_then(|t| t.uri())
            .map(str::to_string);

        let renamed = self.entity.rename_child(&Kind::Type, old_id, new_id)?;
        let new_type_url = renamed.uri().map(str::to_string);

        if self.entity.child_exists(Kind::TypeData, old_id, Scope::Coll) {
            self.entity.rename_child(&Kind::TypeData, old_id, new_id)?;
            let typedata = self.entity.child(Kind::TypeData, new_id)?;
            let data_kind = Kind::EntityData(new_id.to_string());
            for mut instance in typedata.children(&data_kind, Scope::Coll)? {
                if let Some(values) = instance.values_mut() {
                    values.insert(annal::TYPE_ID.to_string(), Value::String(new_id.to_string()));
                    if let (Some(old_url), Some(new_url)) = (&old_type_url, &new_type_url) {
                        replace_type_uri(values, old_url, new_url);
                    }
                }
                instance.save()?;
            }
        }

        let old_ref = format!("/d/{old_id}/");
        let new_ref = format!("/d/{new_id}/");
        for kind in [Kind::View, Kind::List] {
            for mut def in self.entity.children(&kind, Scope::Coll)? {
                let Some(values) = def.values_mut() else { continue };
                let mut changed = rewrite_strings(values, &old_ref, &new_ref);
                for key in [annal::DEFAULT_TYPE, annal::RECORD_TYPE_REF] {
                    if let Some(Value::String(v)) = values.get_mut(key) {
                        if v.as_str() == old_id || *v == format!("_type/{old_id}") {
                            *v = new_id.to_string();
                            changed = true;
                        }
                    }
                }
                if changed {
                    info!(kind = %kind, id = def.id(), old_id, new_id, "updated type references");
                    def.save()?;
                }
            }
        }

        self.flush_caches()?;
        info!(coll_id = self.id(), old_id, new_id, "renamed type");
        Ok(renamed)
    }

    // Typed accessors

    /// Returns the type records visible within `scope`.
    pub fn types(&self, scope: Scope) -> StoreResult<Vec<RecordType>> {
        Ok(self.entities("_type", scope)?.into_iter().map(RecordType::new).collect())
    }

    /// Returns one type record (collection first, then site).
    pub fn get_type(&self, type_id: &str) -> StoreResult<Option<RecordType>> {
        Ok(self.get_entity("_type", type_id, Scope::All)?.map(RecordType::new))
    }

    /// Alias for [`Collection::get_type`].
    pub fn record_type(&self, type_id: &str) -> StoreResult<Option<RecordType>> {
        self.get_type(type_id)
    }

    /// Returns the type record whose URI is `type_uri`.
    pub fn get_uri_type(&self, type_uri: &str) -> StoreResult<Option<RecordType>> {
        Ok(self
            .get_entity_from_uri("_type", type_uri, Scope::All)?
            .map(RecordType::new))
    }

    /// Creates or overwrites a type record, creating its data container.
    pub fn add_type(&self, type_id: &str, values: EntityValues) -> StoreResult<RecordType> {
        let entity = self.add_entity("_type", type_id, values)?;
        let typedata = self.entity.child(Kind::TypeData, type_id)?;
        fs::create_dir_all(typedata.dir())?;
        Ok(RecordType::new(entity))
    }

    /// Removes a type record. Entities of the type are left in place.
    pub fn remove_type(&self, type_id: &str) -> StoreResult<()> {
        self.remove_entity("_type", type_id)
    }

    /// Returns the view records visible within `scope`.
    pub fn views(&self, scope: Scope) -> StoreResult<Vec<Entity>> {
        self.entities("_view", scope)
    }

    /// Returns one view record.
    pub fn get_view(&self, view_id: &str) -> StoreResult<Option<Entity>> {
        self.get_entity("_view", view_id, Scope::All)
    }

    /// Creates or overwrites a view record.
    pub fn add_view(&self, view_id: &str, values: EntityValues) -> StoreResult<Entity> {
        self.add_entity("_view", view_id, values)
    }

    /// Removes a view record.
    pub fn remove_view(&self, view_id: &str) -> StoreResult<()> {
        self.remove_entity("_view", view_id)
    }

    /// Returns the list records visible within `scope`.
    pub fn lists(&self, scope: Scope) -> StoreResult<Vec<Entity>> {
        self.entities("_list", scope)
    }

    /// Returns one list record.
    pub fn get_list(&self, list_id: &str) -> StoreResult<Option<Entity>> {
        self.get_entity("_list", list_id, Scope::All)
    }

    /// Creates or overwrites a list record.
    pub fn add_list(&self, list_id: &str, values: EntityValues) -> StoreResult<Entity> {
        self.add_entity("_list", list_id, values)
    }

    /// Removes a list record.
    pub fn remove_list(&self, list_id: &str) -> StoreResult<()> {
        self.remove_entity("_list", list_id)
    }

    /// Returns the field records visible within `scope`.
    pub fn fields(&self, scope: Scope) -> StoreResult<Vec<Entity>> {
        self.entities("_field", scope)
    }

    /// Returns one field record.
    pub fn get_field(&self, field_id: &str) -> StoreResult<Option<Entity>> {
        self.get_entity("_field", field_id, Scope::All)
    }

    /// Creates or overwrites a field record.
    pub fn add_field(&self, field_id: &str, values: EntityValues) -> StoreResult<Entity> {
        self.add_entity("_field", field_id, values)
    }

    /// Removes a field record.
    pub fn remove_field(&self, field_id: &str) -> StoreResult<()> {
        self.remove_entity("_field", field_id)
    }

    /// Returns the field group records visible within `scope`.
    pub fn groups(&self, scope: Scope) -> StoreResult<Vec<Entity>> {
        self.entities("_group", scope)
    }

    /// Returns one field group record.
    pub fn get_group(&self, group_id: &str) -> StoreResult<Option<Entity>> {
        self.get_entity("_group", group_id, Scope::All)
    }

    /// Creates or overwrites a field group record.
    pub fn add_group(&self, group_id: &str, values: EntityValues) -> StoreResult<Entity> {
        self.add_entity("_group", group_id, values)
    }

    /// Returns the user records visible within `scope`.
    pub fn users(&self, scope: Scope) -> StoreResult<Vec<Entity>> {
        self.entities("_user", scope)
    }

    /// Returns the vocabulary records visible within `scope`.
    pub fn vocabs(&self, scope: Scope) -> StoreResult<Vec<Entity>> {
        self.entities("_vocab", scope)
    }

    /// Creates or overwrites a vocabulary record.
    pub fn add_vocab(&self, vocab_id: &str, values: EntityValues) -> StoreResult<Entity> {
        self.add_entity("_vocab", vocab_id, values)
    }

    /// Returns the access helper for entities of `type_id`.
    pub fn type_info(&self, type_id: &str) -> StoreResult<TypeInfo> {
        TypeInfo::new(self, type_id, false)
    }

    // Users

    /// Creates a user permissions record.
    pub fn create_user_permissions(
        &self,
        user_id: &str,
        user_uri: &str,
        name: &str,
        description: &str,
        permissions: &[&str],
    ) -> StoreResult<Entity> {
        let mut values = EntityValues::new();
        values.insert(annal::TYPE.to_string(), json!(annal::USER));
        values.insert(rdfs::LABEL.to_string(), json!(name));
        values.insert(rdfs::COMMENT.to_string(), json!(description));
        values.insert(annal::USER_URI.to_string(), json!(user_uri));
        values.insert(annal::USER_PERMISSIONS.to_string(), json!(permissions));
        self.add_entity("_user", user_id, values)
    }

    /// Returns the permissions record for a user whose id and authenticated URI both match.
    ///
    /// Incomplete records are ignored.
    pub fn get_user_permissions(&self, user_id: &str, user_uri: &str) -> StoreResult<Option<Entity>> {
        let Some(user) = self.get_entity("_user", user_id, Scope::User)? else {
            return Ok(None);
        };
        let complete = [rdfs::LABEL, rdfs::COMMENT, annal::USER_URI, annal::USER_PERMISSIONS]
            .iter()
            .all(|k| user.get(k).is_some());
        if !complete || user.get_str(annal::USER_URI) != Some(user_uri) {
            debug!(user_id, user_uri, complete, "user permissions not applicable");
            return Ok(None);
        }
        Ok(Some(user))
    }

    // Defaults

    /// Records the list shown by default for this collection.
    pub fn set_default_list(&mut self, list_id: &str) -> StoreResult<()> {
        if let Some(values) = self.entity.values_mut() {
            values.insert(annal::DEFAULT_LIST.to_string(), json!(list_id));
        } else {
            let mut values = EntityValues::new();
            values.insert(annal::DEFAULT_LIST.to_string(), json!(list_id));
            self.entity.set_values(values);
        }
        self.entity.save()
    }

    /// Returns the default list id, if set and still defined.
    pub fn default_list(&self) -> StoreResult<Option<String>> {
        let Some(list_id) = self.entity.get_str(annal::DEFAULT_LIST).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        if self.get_entity("_list", list_id, Scope::All)?.is_none() {
            warn!(list_id, coll_id = self.id(), "default list does not exist");
            return Ok(None);
        }
        Ok(Some(list_id.to_string()))
    }

    // JSON-LD context

    /// Builds the JSON-LD context for this collection's records.
    ///
    /// Vocabulary ids map to namespace URIs; property URIs of fields used in
    /// views and groups get a term definition when their value is a
    /// reference, a set or a list.
    pub fn jsonld_context(&self) -> StoreResult<Map<String, Value>> {
        let mut context = Map::new();
        context.insert(annal::TYPE.to_string(), json!({ jsonld::TYPE: jsonld::ID }));
        for (prefix, ns) in vocab::NAMESPACES {
            context.insert((*prefix).to_string(), json!(ns));
        }
        for v in self.vocabs(Scope::All)? {
            if let Some(uri) = v.get_str(annal::URI).filter(|u| !u.is_empty()) {
                context.insert(v.id().to_string(), json!(uri));
            }
        }

        let mut seen = HashSet::new();
        for view in self.views(Scope::All)? {
            self.add_field_refs(view.get(annal::VIEW_FIELDS), &mut context, &mut seen)?;
        }
        for group in self.groups(Scope::All)? {
            self.add_field_refs(group.get(annal::GROUP_FIELDS), &mut context, &mut seen)?;
        }
        Ok(context)
    }

    fn add_field_refs(
        &self,
        refs: Option<&Value>,
        context: &mut Map<String, Value>,
        seen: &mut HashSet<String>,
    ) -> StoreResult<()> {
        let Some(Value::Array(refs)) = refs else {
            return Ok(());
        };
        for fref in refs {
            let Some(field_id) = fref.get(annal::FIELD_ID).and_then(Value::as_str) else {
                continue;
            };
            let field_id = extract_entity_id(field_id);
            let Some(field) = self.get_entity("_field", field_id, Scope::All)? else {
                warn!(field_id, coll_id = self.id(), "field referenced by view or group not defined");
                continue;
            };
            let override_uri = fref
                .get(annal::PROPERTY_URI)
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty());
            let property_uri = override_uri.or_else(|| field.get_str(annal::PROPERTY_URI));
            let render_type = extract_entity_id(field.get_str(annal::FIELD_RENDER_TYPE).unwrap_or(""));
            let value_mode = extract_entity_id(field.get_str(annal::FIELD_VALUE_MODE).unwrap_or(""));
            let fcontext = field_jsonld_context(render_type, value_mode);
            if let Some(uri) = property_uri {
                set_property_context(uri, fcontext, context);
            }
            if seen.insert(field_id.to_string()) {
                self.add_field_refs(field.get(annal::FIELD_FIELDS), context, seen)?;
            }
        }
        Ok(())
    }

    /// Writes `coll_context.jsonld` for this collection.
    pub fn generate_context(&self) -> StoreResult<()> {
        let context = self.jsonld_context()?;
        let path = self.dir().join(COLL_CONTEXT_FILE);
        write_json_atomic(&path, &json!({ jsonld::CONTEXT: context }))?;
        debug!(coll_id = self.id(), path = %path.display(), "generated collection context");
        Ok(())
    }

    // Maintenance

    /// Re-saves every collection-local record in its current format and regenerates the context.
    ///
    /// Returns the number of records written.
    pub fn migrate_data(&self) -> StoreResult<usize> {
        let mut count = 0usize;
        let mut type_ids: Vec<String> = crate::layout::BUILTIN_TYPE_IDS
            .iter()
            .map(|t| (*t).to_string())
            .collect();
        for t in self.entity.child_ids(&Kind::Type, Scope::Coll)? {
            if !type_ids.contains(&t) {
                type_ids.push(t);
            }
        }
        for type_id in &type_ids {
            let parent = self.parent_for(type_id)?;
            for mut entity in parent.children(&Kind::for_type_id(type_id), Scope::Coll)? {
                if let Some((path, message)) = entity.error() {
                    warn!(path, message, "skipping unreadable entity during migration");
                    continue;
                }
                entity.save()?;
                count += 1;
            }
        }
        self.flush_caches()?;
        self.generate_context()?;
        info!(coll_id = self.id(), count, "migrated collection data");
        Ok(count)
    }

    /// Drops every cached entry of this collection.
    pub fn flush_caches(&self) -> StoreResult<()> {
        self.site.caches().flush_collection(self.id())
    }
}

/// Adds a property term definition, warning when an existing one disagrees.
fn set_property_context(uri: &str, fcontext: Option<Value>, context: &mut Map<String, Value>) {
    let Some((prefix, _)) = uri.split_once(':') else {
        return;
    };
    if let Some(existing) = context.get(uri) {
        let compatible = fcontext.as_ref().is_some_and(|f| {
            f.get(jsonld::TYPE) == existing.get(jsonld::TYPE) && f.get("@container") == existing.get("@container")
        });
        if !compatible {
            warn!(property = uri, ?fcontext, ?existing, "incompatible use of property");
        }
        return;
    }
    let known_prefix = context.contains_key(prefix) || matches!(prefix, "http" | "https" | "file");
    if let (Some(f), true) = (fcontext, known_prefix) {
        context.insert(uri.to_string(), f);
    }
}

fn rewrite_strings(values: &mut EntityValues, from: &str, to: &str) -> bool {
    fn walk(v: &mut Value, from: &str, to: &str) -> bool {
        match v {
            Value::String(s) if s.contains(from) => {
                *s = s.replace(from, to);
                true
            }
            Value::Array(items) => items.iter_mut().fold(false, |acc, i| walk(i, from, to) | acc),
            Value::Object(map) => map.values_mut().fold(false, |acc, i| walk(i, from, to) | acc),
            _ => false,
        }
    }
    values.values_mut().fold(false, |acc, v| walk(v, from, to) | acc)
}

fn replace_type_uri(values: &mut EntityValues, old: &str, new: &str) {
    if let Some(Value::Array(types)) = values.get_mut(jsonld::TYPE) {
        for t in types.iter_mut() {
            if t.as_str() == Some(old) {
                *t = Value::String(new.to_string());
            }
        }
    }
}
