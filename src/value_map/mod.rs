//! Mapping between stored entity values, rendering contexts and form data.
//!
//! An [`EntityValueMap`] is an ordered list of [`MapEntry`] values. Rendering
//! walks the list to build a context; a form submission walks it again to
//! rebuild entity values, reassembling repeated groups from their prefixed
//! form keys.

pub mod entry;
pub mod padding;

pub use entry::{
    repeat_prefix, FieldListValueMap, FieldRowMap, FieldValueMap, FormData, MapEntry, RepeatValuesMap,
    SimpleValueMap,
};
pub use padding::{Padding, Placed, RowPosition};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::entity::EntityValues;
use crate::error::StoreResult;
use crate::field::FieldDescriber;
use crate::vocab::annal;

/// Context key of the view's field list.
pub const FIELDS_KEY: &str = "fields";

/// An ordered list of value map entries.
#[derive(Debug, Clone, Default)]
pub struct EntityValueMap {
    entries: Vec<MapEntry>,
}

impl EntityValueMap {
    /// Creates a map from entries.
    #[must_use]
    pub fn new(entries: Vec<MapEntry>) -> Self {
        Self { entries }
    }

    /// Builds the map for an entity view: identity entries, then the view's fields.
    ///
    /// # Errors
    /// Errors from describing the fields (such as a recursive group).
    pub fn for_view(describer: &FieldDescriber<'_>, field_refs: &[Value]) -> StoreResult<Self> {
        let descriptions = field_refs
            .iter()
            .map(|f| describer.describe(f))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut map = Self::new(vec![
            MapEntry::Simple(SimpleValueMap::new("entity_id", Some(annal::ID), Some("entity_id"))),
            MapEntry::Simple(SimpleValueMap::new(
                "entity_type_id",
                Some(annal::TYPE_ID),
                Some("entity_type"),
            )),
            MapEntry::Stable(SimpleValueMap::new("entity_uri", Some(annal::URI), None)),
            MapEntry::Stable(SimpleValueMap::new("entity_url", Some(annal::URL), None)),
        ]);
        map.add_entry(MapEntry::List(FieldListValueMap::new(FIELDS_KEY, descriptions)));
        Ok(map)
    }

    /// Appends an entry.
    pub fn add_entry(&mut self, entry: MapEntry) {
        self.entries.push(entry);
    }

    /// Returns the entries in order.
    #[must_use]
    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.iter()
    }

    /// Builds a rendering context from entity values.
    ///
    /// Entity values take priority; `extras` supply values the entity lacks.
    #[must_use]
    pub fn map_entity_to_context(&self, values: &EntityValues, extras: &Map<String, Value>) -> Map<String, Value> {
        let mut context = Map::new();
        for entry in &self.entries {
            entry.map_entity_to_context(values, extras, &mut context);
        }
        context
    }

    /// Updates `entity` from submitted form data.
    ///
    /// Form keys no entry covers are ignored. Values whose form keys are
    /// absent stay as they are, except checkboxes (unchecked boxes are not
    /// submitted) and repeated groups (rebuilt from whatever items are present).
    pub fn map_form_to_entity(&self, form: &FormData, entity: &mut EntityValues) {
        debug!(keys = form.len(), "map form to entity");
        for entry in &self.entries {
            entry.map_form_to_entity(form, entity);
        }
    }

    /// Returns the entity values described by a form.
    #[must_use]
    pub fn map_form_to_values(&self, form: &FormData) -> EntityValues {
        let mut values = EntityValues::new();
        self.map_form_to_entity(form, &mut values);
        values
    }

    /// Builds a context for re-displaying a submitted form.
    #[must_use]
    pub fn map_form_to_context(&self, form: &FormData, extras: &Map<String, Value>) -> Map<String, Value> {
        let mut values = self.map_form_to_values(form);
        let form_str = |k: &str| form.get(k).cloned().unwrap_or_else(|| json!(""));
        values.insert("entity_id".into(), form_str("entity_id"));
        values.insert("entity_type_id".into(), form_str("entity_type"));
        values.insert("entity_link".into(), json!(""));
        values.insert("entity_type_link".into(), json!(""));
        self.map_entity_to_context(&values, extras)
    }

    /// Returns a description of each entry's structure.
    #[must_use]
    pub fn structure(&self) -> Value {
        Value::Array(self.entries.iter().map(MapEntry::structure).collect())
    }
}

impl<'a> IntoIterator for &'a EntityValueMap {
    type Item = &'a MapEntry;
    type IntoIter = std::slice::Iter<'a, MapEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::finder::SelectorContext;
    use crate::model::{Collection, Site};
    use tempfile::{tempdir, TempDir};

    fn values(v: Value) -> EntityValues {
        let Value::Object(map) = v else { unreachable!() };
        map
    }

    fn setup() -> (TempDir, Collection) {
        let dir = tempdir().unwrap();
        let site = Site::open(StoreConfig::new(dir.path()).validate().unwrap()).unwrap();
        site.initialize("test").unwrap();
        let coll = site.create_collection("testcoll", EntityValues::new()).unwrap();
        let add = |id: &str, v: Value| {
            coll.add_field(id, values(v)).unwrap();
        };
        add(
            "Entity_label",
            json!({
                "annal:property_uri": "rdfs:label",
                "annal:field_render_type": "Text",
                "annal:field_placement": "small:0,12;medium:0,6"
            }),
        );
        add(
            "Entity_comment",
            json!({
                "annal:property_uri": "rdfs:comment",
                "annal:field_render_type": "Markdown",
                "annal:field_placement": "small:0,12"
            }),
        );
        add(
            "Entity_tags",
            json!({
                "annal:property_uri": "ex:tags",
                "annal:field_render_type": "TokenSet",
                "annal:field_placement": "small:0,12;medium:6,6"
            }),
        );
        add(
            "Entity_flag",
            json!({
                "annal:property_uri": "ex:flag",
                "annal:field_render_type": "CheckBox",
                "annal:field_placement": "small:0,12"
            }),
        );
        add(
            "Ref_url",
            json!({
                "annal:property_uri": "ex:url",
                "annal:field_render_type": "Text",
                "annal:field_placement": "small:0,12;medium:0,6"
            }),
        );
        add(
            "Refs",
            json!({
                "annal:property_uri": "ex:refs",
                "annal:field_render_type": "Group_Seq_Row",
                "annal:field_fields": [
                    {"annal:field_id": "_field/Ref_url"},
                    {"annal:field_id": "_field/Entity_comment"}
                ]
            }),
        );
        (dir, coll)
    }

    fn view_map(coll: &Collection, ids: &[&str]) -> EntityValueMap {
        let refs: Vec<Value> = ids.iter().map(|id| json!({ "annal:field_id": id })).collect();
        let describer = FieldDescriber::new(coll, SelectorContext::new()).unwrap();
        EntityValueMap::for_view(&describer, &refs).unwrap()
    }

    fn form(v: Value) -> FormData {
        values(v)
    }

    #[test]
    fn test_rows_and_padding() {
        let (_dir, coll) = setup();
        let map = view_map(&coll, &["Entity_label", "Entity_tags", "Entity_comment"]);
        let MapEntry::List(list) = &map.entries()[4] else { panic!("expected field list") };
        assert_eq!(list.entries().len(), 2);
        let MapEntry::Row(first) = &list.entries()[0] else { panic!("expected row") };
        assert_eq!(first.cells().len(), 2);
        assert!(first.cells().iter().all(|c| matches!(c, MapEntry::Field(_))));
        let MapEntry::Row(second) = &list.entries()[1] else { panic!("expected row") };
        assert_eq!(second.cells().len(), 1);
    }

    #[test]
    fn test_entity_to_context() {
        let (_dir, coll) = setup();
        let map = view_map(&coll, &["Entity_label", "Entity_tags"]);
        let entity = values(json!({
            "annal:id": "e1",
            "annal:type_id": "t1",
            "annal:uri": "ex:e1",
            "rdfs:label": "Entity one",
            "ex:tags": ["a", "b"]
        }));
        let extras = values(json!({"entity_url": "unused"}));
        let ctx = map.map_entity_to_context(&entity, &extras);
        assert_eq!(ctx["entity_id"], json!("e1"));
        assert_eq!(ctx["entity_uri"], json!("ex:e1"));
        assert_eq!(ctx["entity_url"], json!("unused"));
        let row = &ctx[FIELDS_KEY][0]["row_fields"];
        assert_eq!(row[0]["field_value"], json!("Entity one"));
        assert_eq!(row[1]["field_value_encoded"], json!("a b"));
    }

    #[test]
    fn test_form_to_entity() {
        let (_dir, coll) = setup();
        let map = view_map(&coll, &["Entity_label", "Entity_tags", "Entity_flag"]);
        let mut entity = values(json!({
            "annal:id": "e1",
            "rdfs:comment": "kept",
            "ex:flag": true
        }));
        let submitted = form(json!({
            "entity_id": "e1",
            "Entity_label": "New label",
            "Entity_tags": "x y",
            "unknown_key": "ignored"
        }));
        map.map_form_to_entity(&submitted, &mut entity);
        assert_eq!(entity["rdfs:label"], json!("New label"));
        assert_eq!(entity["ex:tags"], json!(["x", "y"]));
        assert_eq!(entity["ex:flag"], json!(false));
        assert_eq!(entity["rdfs:comment"], json!("kept"));
        assert!(!entity.contains_key("unknown_key"));
    }

    #[test]
    fn test_repeat_group_round_trip() {
        let (_dir, coll) = setup();
        let map = view_map(&coll, &["Entity_label", "Refs"]);
        let entity = values(json!({
            "rdfs:label": "L",
            "ex:refs": [
                {"ex:url": "http://a.example/", "rdfs:comment": "first"},
                {"ex:url": "http://b.example/"}
            ]
        }));
        let ctx = map.map_entity_to_context(&entity, &Map::new());
        let group = &ctx[FIELDS_KEY][1];
        assert_eq!(group["field_id"], json!("Refs"));
        let items = group["repeat"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["repeat_prefix"], json!("Refs__1__"));
        let cell = &items[0]["repeat_bound_fields"][0]["row_fields"][0];
        assert_eq!(cell["field_instance_name"], json!("Refs__0__Ref_url"));
        assert_eq!(cell["field_value"], json!("http://a.example/"));

        let submitted = form(json!({
            "Entity_label": "L",
            "Refs__0__Ref_url": "http://c.example/",
            "Refs__0__Entity_comment": "c",
            "Refs__1__Ref_url": "http://d.example/",
            "Refs__3__Ref_url": "http://skipped.example/"
        }));
        let mut updated = entity.clone();
        map.map_form_to_entity(&submitted, &mut updated);
        assert_eq!(
            updated["ex:refs"],
            json!([
                {"ex:url": "http://c.example/", "rdfs:comment": "c"},
                {"ex:url": "http://d.example/"}
            ])
        );
    }

    #[test]
    fn test_form_to_context_and_structure() {
        let (_dir, coll) = setup();
        let map = view_map(&coll, &["Entity_label"]);
        let submitted = form(json!({"entity_id": "e9", "entity_type": "t1", "Entity_label": "Typed"}));
        let ctx = map.map_form_to_context(&submitted, &Map::new());
        assert_eq!(ctx["entity_id"], json!("e9"));
        assert_eq!(ctx["entity_type_id"], json!("t1"));
        assert_eq!(ctx[FIELDS_KEY][0]["row_fields"][0]["field_value"], json!("Typed"));
        let s = map.structure();
        assert_eq!(s[0]["field_type"], json!("SimpleValueMap"));
        assert_eq!(s[2]["field_type"], json!("StableValueMap"));
        assert_eq!(s[4]["field_type"], json!("FieldListValueMap"));
    }
}
