//! Per-type access helper.
//!
//! [`TypeInfo`] binds a collection to one type id and answers the questions
//! callers ask about records of that type: where they live, which type URIs
//! they carry, what values a new record starts with and which permission an
//! action on them needs.

use std::fs;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::entity::{Entity, EntityValues, Kind, Scope};
use crate::error::{StoreError, StoreResult};
use crate::layout::INITIAL_VALUES_ID;
use crate::util::ident::{extract_entity_id, valid_id};
use crate::vocab::{annal, jsonld, rdfs};

use super::collection::Collection;
use super::record_type::{RecordType, DEFAULT_LIST_ID, DEFAULT_VIEW_ID};

/// Actions a caller may perform on records, each mapped to a permission token.
pub const ACTIONS: &[&str] = &["view", "list", "search", "new", "copy", "edit", "delete", "config", "admin"];

type PermissionMap = [(&'static str, &'static str); 9];

const ADMIN_PERMISSIONS: PermissionMap = [
    ("view", "ADMIN"),
    ("list", "ADMIN"),
    ("search", "ADMIN"),
    ("new", "ADMIN"),
    ("copy", "ADMIN"),
    ("edit", "ADMIN"),
    ("delete", "ADMIN"),
    ("config", "CONFIG"),
    ("admin", "ADMIN"),
];

const CONFIG_PERMISSIONS: PermissionMap = [
    ("view", "VIEW"),
    ("list", "VIEW"),
    ("search", "VIEW"),
    ("new", "CONFIG"),
    ("copy", "CONFIG"),
    ("edit", "CONFIG"),
    ("delete", "CONFIG"),
    ("config", "CONFIG"),
    ("admin", "ADMIN"),
];

const ENTITY_PERMISSIONS: PermissionMap = [
    ("view", "VIEW"),
    ("list", "VIEW"),
    ("search", "VIEW"),
    ("new", "CREATE"),
    ("copy", "CREATE"),
    ("edit", "UPDATE"),
    ("delete", "DELETE"),
    ("config", "CONFIG"),
    ("admin", "ADMIN"),
];

fn permissions_for(kind: &Kind) -> &'static PermissionMap {
    match kind {
        Kind::User => &ADMIN_PERMISSIONS,
        k if k.is_metadata() => &CONFIG_PERMISSIONS,
        _ => &ENTITY_PERMISSIONS,
    }
}

/// Access to the records of one type within a collection.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    coll: Collection,
    type_id: String,
    kind: Kind,
    record_type: Option<RecordType>,
    permissions: &'static PermissionMap,
}

impl TypeInfo {
    /// Binds `coll` to `type_id`.
    ///
    /// With `create_typedata`, the storage container for a user-defined type
    /// is created if missing.
    ///
    /// # Errors
    /// `InvalidId` if `type_id` is not a valid slug.
    pub fn new(coll: &Collection, type_id: &str, create_typedata: bool) -> StoreResult<Self> {
        if !valid_id(type_id, false) {
            return Err(StoreError::invalid_id(type_id));
        }
        let kind = Kind::for_type_id(type_id);
        let record_type = coll.get_type(type_id)?;
        if record_type.is_none() {
            warn!(type_id, coll_id = coll.id(), "record type not found");
        }
        if create_typedata && !kind.is_metadata() {
            let typedata = coll.entity().child(Kind::TypeData, type_id)?;
            if !typedata.exists(Scope::Coll) {
                coll.entity().create_child(Kind::TypeData, type_id, EntityValues::new())?;
            }
        }
        Ok(Self {
            coll: coll.clone(),
            type_id: type_id.to_string(),
            permissions: permissions_for(&kind),
            kind,
            record_type,
        })
    }

    /// Returns the type id.
    #[must_use]
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// Returns the storage kind of records of this type.
    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Returns the collection this helper is bound to.
    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.coll
    }

    /// Returns the type definition, if one exists in the collection or site.
    #[must_use]
    pub fn record_type(&self) -> Option<&RecordType> {
        self.record_type.as_ref()
    }

    /// Returns the type URI, if the type is defined.
    #[must_use]
    pub fn type_uri(&self) -> Option<&str> {
        self.record_type.as_ref().and_then(RecordType::type_uri)
    }

    /// Returns the type URI followed by the declared supertype URIs.
    #[must_use]
    pub fn all_type_uris(&self) -> Vec<String> {
        self.record_type
            .as_ref()
            .map(RecordType::all_type_uris)
            .unwrap_or_default()
    }

    /// Tests whether the container for records of this type exists.
    #[must_use]
    pub fn parent_exists(&self) -> bool {
        match self.coll.parent_for(&self.type_id) {
            Ok(parent) => parent.exists(Scope::Coll),
            Err(_) => false,
        }
    }

    /// Tests whether a record exists within `scope`.
    pub fn entity_exists(&self, id: &str, scope: Scope) -> StoreResult<bool> {
        self.coll.entity_exists(&self.type_id, id, scope)
    }

    /// Creates or overwrites a record.
    ///
    /// `@type` is replaced by this type's URIs, and an `annal:uri` equal to
    /// the record URL is dropped.
    pub fn create_entity(&self, id: &str, mut values: EntityValues) -> StoreResult<Entity> {
        if values.contains_key(annal::URI) && values.get(annal::URI) == values.get(annal::URL) {
            values.remove(annal::URI);
        }
        values.insert(jsonld::TYPE.to_string(), json!(self.all_type_uris()));
        self.coll.add_entity(&self.type_id, id, values)
    }

    /// Removes a collection-local record.
    pub fn remove_entity(&self, id: &str) -> StoreResult<()> {
        self.coll.remove_entity(&self.type_id, id)
    }

    /// Returns an existing record, looking in the site overlay too.
    ///
    /// `id` may be given as `type_id/entity_id`; invalid ids give `Ok(None)`.
    pub fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>> {
        let id = extract_entity_id(id);
        if !valid_id(id, false) {
            return Ok(None);
        }
        self.coll.get_entity(&self.type_id, id, Scope::All)
    }

    /// Returns an unsaved record initialized from this type's initial values.
    pub fn new_entity(&self, id: &str) -> StoreResult<Entity> {
        let parent = self.coll.parent_for(&self.type_id)?;
        let mut entity = parent.child(self.kind.clone(), extract_entity_id(id))?;
        entity.set_values(self.initial_values(entity.id())?);
        Ok(entity)
    }

    /// Returns an existing record, or creates and saves one from the initial values.
    pub fn get_create_entity(&self, id: &str) -> StoreResult<Entity> {
        if let Some(existing) = self.get_entity(id)? {
            return Ok(existing);
        }
        let values = self.initial_values(extract_entity_id(id))?;
        self.coll.add_entity(&self.type_id, extract_entity_id(id), values)
    }

    /// Returns the values a new record `id` starts with.
    ///
    /// An `_initial_values` template stored with the type is used when present.
    pub fn initial_values(&self, id: &str) -> StoreResult<EntityValues> {
        let parent = self.coll.parent_for(&self.type_id)?;
        let template = parent.load_child(self.kind.clone(), INITIAL_VALUES_ID, Scope::All)?;
        let mut values = match template.and_then(Entity::into_values) {
            Some(mut v) => {
                v.remove(jsonld::ID);
                v.remove(annal::ID);
                v.remove(annal::URL);
                v
            }
            None => {
                let mut v = EntityValues::new();
                v.insert(jsonld::TYPE.to_string(), json!([annal::ENTITY_DATA]));
                v.insert(annal::TYPE_ID.to_string(), json!(self.type_id));
                v.insert(rdfs::LABEL.to_string(), json!(""));
                v.insert(rdfs::COMMENT.to_string(), json!(""));
                v
            }
        };
        values.insert(annal::ID.to_string(), json!(id));
        Ok(values)
    }

    /// Returns a record's values with field aliases applied.
    ///
    /// An alias fills its target from its source when the target is missing or empty.
    #[must_use]
    pub fn inferred_values(&self, entity: &Entity) -> EntityValues {
        let mut values = entity.values().cloned().unwrap_or_default();
        let Some(record_type) = &self.record_type else {
            return values;
        };
        for alias in record_type.field_aliases() {
            let empty = match values.get(&alias.target) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if empty {
                let source = values.get(&alias.source).cloned().unwrap_or_else(|| json!(""));
                values.insert(alias.target.clone(), source);
            }
        }
        values
    }

    /// Copies attached files of another record into record `new_id`, skipping names already present.
    ///
    /// Returns the number of files copied.
    pub fn copy_data_files(&self, new_id: &str, old: &TypeInfo, old_id: &str) -> StoreResult<usize> {
        let Some(target) = self.coll.get_entity(&self.type_id, new_id, Scope::Coll)? else {
            warn!(type_id = %self.type_id, new_id, "copy target not found");
            return Ok(0);
        };
        let Some(source) = old.coll.get_entity(&old.type_id, old_id, Scope::All)? else {
            warn!(type_id = %old.type_id, old_id, "copy source not found");
            return Ok(0);
        };
        let source_dir = source.dir_in_use().to_path_buf();
        let mut copied = 0usize;
        for name in source.attachments()? {
            let dest = target.dir().join(&name);
            if dest.exists() {
                continue;
            }
            fs::copy(source_dir.join(&name), &dest)?;
            copied += 1;
        }
        debug!(from = old_id, to = new_id, copied, "copied attached files");
        Ok(copied)
    }

    /// Returns the ids of records visible within `scope`.
    pub fn entity_ids(&self, scope: Scope) -> StoreResult<Vec<String>> {
        self.coll.entity_ids(&self.type_id, scope)
    }

    fn may_list(&self, user_permissions: Option<&[String]>) -> bool {
        match (user_permissions, self.required_permission("list")) {
            (Some(perms), Some(needed)) => perms.iter().any(|p| p == needed),
            _ => true,
        }
    }

    /// Returns the records visible within `scope`.
    ///
    /// When `user_permissions` is supplied and lacks the list permission for
    /// this type, nothing is returned.
    pub fn entities(&self, scope: Scope, user_permissions: Option<&[String]>) -> StoreResult<Vec<Entity>> {
        if !self.may_list(user_permissions) {
            return Ok(Vec::new());
        }
        self.coll.entities(&self.type_id, scope)
    }

    /// Like [`TypeInfo::entities`], with field aliases applied to each record.
    pub fn entities_with_inferred_values(
        &self,
        scope: Scope,
        user_permissions: Option<&[String]>,
    ) -> StoreResult<Vec<Entity>> {
        let mut out = Vec::new();
        for entity in self.entities(scope, user_permissions)? {
            let values = self.inferred_values(&entity);
            let origin = entity.origin().unwrap_or(crate::entity::Origin::Primary);
            out.push(entity.restore(values, origin));
        }
        Ok(out)
    }

    /// Returns the view used to display records of this type.
    #[must_use]
    pub fn default_view_id(&self) -> &str {
        match &self.record_type {
            Some(t) => t.view_id(),
            None => {
                warn!(type_id = %self.type_id, "no type data for default view");
                DEFAULT_VIEW_ID
            }
        }
    }

    /// Returns the list used to enumerate records of this type.
    #[must_use]
    pub fn default_list_id(&self) -> &str {
        match &self.record_type {
            Some(t) => t.list_id(),
            None => {
                warn!(type_id = %self.type_id, "no type data for default list");
                DEFAULT_LIST_ID
            }
        }
    }

    /// Returns the permission token an action on records of this type requires.
    #[must_use]
    pub fn required_permission(&self, action: &str) -> Option<&'static str> {
        self.permissions
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, p)| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::model::site::Site;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Collection) {
        let dir = tempdir().unwrap();
        let site = Site::open(StoreConfig::new(dir.path()).validate().unwrap()).unwrap();
        site.initialize("test").unwrap();
        let coll = site.create_collection("testcoll", EntityValues::new()).unwrap();
        (dir, coll)
    }

    fn vals(v: Value) -> EntityValues {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_create_entity_sets_type_uris() {
        let (_dir, coll) = setup();
        coll.add_type(
            "t1",
            vals(json!({"annal:uri": "test:t1", "annal:supertype_uris": [{"annal:supertype_uri": "test:ts"}]})),
        )
        .unwrap();
        let info = coll.type_info("t1").unwrap();
        assert_eq!(info.all_type_uris(), vec!["test:t1".to_string(), "test:ts".to_string()]);
        let e = info
            .create_entity("e1", vals(json!({"annal:uri": "/x", "annal:url": "/x"})))
            .unwrap();
        assert!(e.get(annal::URI).is_none());
        let loaded = info.get_entity("t1/e1").unwrap().unwrap();
        assert_eq!(loaded.types(), vec!["test:t1", "test:ts", "annal:EntityData"]);
    }

    #[test]
    fn test_initial_values_default_and_template() {
        let (_dir, coll) = setup();
        let info = TypeInfo::new(&coll, "t1", true).unwrap();
        assert!(info.parent_exists());
        let v = info.initial_values("e9").unwrap();
        assert_eq!(v[annal::ID], json!("e9"));
        assert_eq!(v[rdfs::LABEL], json!(""));

        coll.parent_for("t1")
            .unwrap()
            .create_child(
                Kind::EntityData("t1".into()),
                INITIAL_VALUES_ID,
                vals(json!({"rdfs:label": "New thing"})),
            )
            .unwrap();
        let e = info.new_entity("e9").unwrap();
        assert_eq!(e.label(), "New thing");
        assert_eq!(e.get_str(annal::ID), Some("e9"));
        assert!(info.entity_ids(Scope::All).unwrap().is_empty());
        assert!(info.get_entity(INITIAL_VALUES_ID).unwrap().is_none());
    }

    #[test]
    fn test_get_create_entity() {
        let (_dir, coll) = setup();
        let info = TypeInfo::new(&coll, "t1", true).unwrap();
        let e = info.get_create_entity("e1").unwrap();
        assert_eq!(e.id(), "e1");
        assert!(info.entity_exists("e1", Scope::Coll).unwrap());
    }

    #[test]
    fn test_inferred_values_apply_aliases() {
        let (_dir, coll) = setup();
        coll.add_type(
            "t1",
            vals(json!({"annal:field_aliases": [
                {"annal:alias_target": "rdfs:label", "annal:alias_source": "dc:title"}
            ]})),
        )
        .unwrap();
        let info = coll.type_info("t1").unwrap();
        info.create_entity("e1", vals(json!({"dc:title": "Title", "rdfs:label": ""})))
            .unwrap();
        info.create_entity("e2", vals(json!({"dc:title": "Other", "rdfs:label": "Kept"})))
            .unwrap();
        let all = info.entities_with_inferred_values(Scope::Coll, None).unwrap();
        let labels: Vec<&str> = all.iter().map(Entity::label).collect();
        assert_eq!(labels, vec!["Title", "Kept"]);
    }

    #[test]
    fn test_permissions() {
        let (_dir, coll) = setup();
        assert_eq!(coll.type_info("_user").unwrap().required_permission("view"), Some("ADMIN"));
        assert_eq!(coll.type_info("_view").unwrap().required_permission("edit"), Some("CONFIG"));
        let data = coll.type_info("t1").unwrap();
        assert_eq!(data.required_permission("new"), Some("CREATE"));
        assert_eq!(data.required_permission("bogus"), None);
        coll.add_entity("t1", "e1", EntityValues::new()).unwrap();
        let none: Vec<String> = vec!["VIEW".into()];
        assert_eq!(data.entities(Scope::Coll, Some(&none)).unwrap().len(), 1);
        let no_view: Vec<String> = vec!["CREATE".into()];
        assert!(data.entities(Scope::Coll, Some(&no_view)).unwrap().is_empty());
    }

    #[test]
    fn test_defaults_and_invalid_type() {
        let (_dir, coll) = setup();
        let info = coll.type_info("undefined").unwrap();
        assert_eq!(info.default_view_id(), DEFAULT_VIEW_ID);
        assert_eq!(info.default_list_id(), DEFAULT_LIST_ID);
        assert!(coll.type_info("bad id").unwrap_err().is_invalid_id());
    }

    #[test]
    fn test_copy_data_files() {
        let (_dir, coll) = setup();
        let info = TypeInfo::new(&coll, "t1", true).unwrap();
        let src = info.create_entity("e1", EntityValues::new()).unwrap();
        src.create_resource("image.png").unwrap().write_all(b"png").unwrap();
        info.create_entity("e2", EntityValues::new()).unwrap();
        assert_eq!(info.copy_data_files("e2", &info, "e1").unwrap(), 1);
        assert_eq!(info.copy_data_files("e2", &info, "e1").unwrap(), 0);
        let copied = info.get_entity("e2").unwrap().unwrap();
        assert_eq!(copied.attachments().unwrap(), vec!["image.png".to_string()]);
    }
}
