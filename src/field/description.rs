//! Field descriptions: a field definition compiled for use in one view.
//!
//! A view lists field references (`annal:field_id` plus optional property
//! and placement overrides). Each reference is resolved against the
//! collection's `_field` records, group fields are expanded recursively, and
//! fields that reference another type get their choice list from the
//! entity finder.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::entity::{EntityValues, Scope};
use crate::error::{StoreResult, ValidationError};
use crate::finder::{EntityFinder, FinderQuery, SelectorContext};
use crate::layout::INITIAL_VALUES_ID;
use crate::model::Collection;
use crate::util::ident::extract_entity_id;
use crate::vocab::{annal, jsonld, rdfs};

use super::placement::Placement;
use super::renderer::{
    is_enum_render_type, is_repeat_render_type, value_mode, FieldRenderer, RenderMode, ValueMapper,
    OPTIONAL_ENUM_RENDER_TYPES,
};

/// Field record used when a view refers to an undefined field.
pub const MISSING_FIELD_ID: &str = "Field_missing";

/// One option of an enumerated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChoice {
    /// Stored value: `type_id/entity_id` of the chosen entity.
    pub id: String,
    /// Display label.
    pub label: String,
    /// View URL of the chosen entity.
    pub link: Option<String>,
}

/// Sub-property relation between field property URIs.
#[derive(Debug, Clone, Default)]
pub struct PropertyHierarchy {
    superproperties: HashMap<String, Vec<String>>,
}

impl PropertyHierarchy {
    /// Builds the relation from `annal:superproperty_uri` declarations on field records.
    #[must_use]
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a EntityValues>) -> Self {
        let mut out = Self::default();
        for f in fields {
            let Some(uri) = f.get(annal::PROPERTY_URI).and_then(Value::as_str) else {
                continue;
            };
            let Some(Value::Array(supers)) = f.get(annal::SUPERPROPERTY_URI) else {
                continue;
            };
            let entry = out.superproperties.entry(uri.to_string()).or_default();
            for s in supers {
                let sup = s.get(jsonld::ID).and_then(Value::as_str).or_else(|| s.as_str());
                if let Some(sup) = sup.filter(|s| !s.is_empty()) {
                    entry.push(sup.to_string());
                }
            }
        }
        out
    }

    /// Returns every transitive superproperty of `uri`.
    #[must_use]
    pub fn superproperty_uris(&self, uri: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut pending = vec![uri.to_string()];
        while let Some(u) = pending.pop() {
            for s in self.superproperties.get(&u).into_iter().flatten() {
                if s != uri && seen.insert(s.clone()) {
                    pending.push(s.clone());
                }
            }
        }
        seen
    }

    /// Returns every property declared as a transitive subproperty of `uri`, sorted.
    #[must_use]
    pub fn subproperty_uris(&self, uri: &str) -> Vec<String> {
        let mut subs: Vec<String> = self
            .superproperties
            .keys()
            .filter(|p| p.as_str() != uri && self.superproperty_uris(p).contains(uri))
            .cloned()
            .collect();
        subs.sort();
        subs
    }
}

/// The nested fields of a group field.
#[derive(Debug, Clone)]
pub struct FieldGroup {
    /// Id of the field (or legacy group record) defining the group.
    pub group_id: String,
    /// Heading for the group.
    pub label: String,
    /// Label of the control adding a repeated item.
    pub add_label: String,
    /// Label of the control removing repeated items.
    pub delete_label: String,
    /// Field references as stored in the definition.
    pub field_list: Vec<Value>,
    /// The expanded descriptions of `field_list`.
    pub fields: Vec<FieldDescription>,
}

/// A field definition prepared for one view.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    field_id: String,
    field_name: String,
    instance_name: String,
    label: String,
    help: String,
    placeholder: String,
    tooltip: String,
    property_uri: String,
    value_type: String,
    value_mode: String,
    renderer: FieldRenderer,
    placement_text: String,
    placement: Placement,
    default_value: Option<Value>,
    ref_type: Option<String>,
    ref_field: Option<String>,
    ref_restriction: String,
    entity_type: Option<String>,
    group_ref: Option<String>,
    choices: Option<Vec<FieldChoice>>,
    group: Option<FieldGroup>,
    subproperty_uris: Vec<String>,
    suffix_index: usize,
}

fn str_value<'a>(values: &'a EntityValues, key: &str) -> Option<&'a str> {
    values.get(key).and_then(Value::as_str)
}

fn ref_id(values: &EntityValues, key: &str) -> Option<String> {
    str_value(values, key)
        .map(extract_entity_id)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pairs of form field names and property URIs already used in one view.
#[derive(Debug, Default)]
pub struct SeenProperties {
    names: HashSet<String>,
    properties: HashSet<String>,
}

impl FieldDescription {
    /// Returns the field id.
    #[must_use]
    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    /// Returns the form field name (with any duplicate suffix).
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Returns the full form name including repeat-group prefixes.
    #[must_use]
    pub fn field_instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Sets the full form name used while expanding repeat groups.
    pub fn set_field_instance_name(&mut self, name: impl Into<String>) {
        self.instance_name = name.into();
    }

    /// Returns the field label.
    #[must_use]
    pub fn field_label(&self) -> &str {
        &self.label
    }

    /// Returns the help text (the field's `rdfs:comment`).
    #[must_use]
    pub fn field_help(&self) -> &str {
        &self.help
    }

    /// Returns the input placeholder.
    #[must_use]
    pub fn field_placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Returns the tooltip, falling back to the help text.
    #[must_use]
    pub fn field_tooltip(&self) -> &str {
        if self.tooltip.is_empty() {
            &self.help
        } else {
            &self.tooltip
        }
    }

    /// Returns the property URI under which values are stored (with any duplicate suffix).
    #[must_use]
    pub fn property_uri(&self) -> &str {
        &self.property_uri
    }

    /// Returns the declared value type.
    #[must_use]
    pub fn field_value_type(&self) -> &str {
        &self.value_type
    }

    /// Returns the value mode (`Value_direct`, `Value_entity`, ...).
    #[must_use]
    pub fn field_value_mode(&self) -> &str {
        &self.value_mode
    }

    /// Returns the render type.
    #[must_use]
    pub fn render_type(&self) -> &str {
        self.renderer.render_type()
    }

    /// Returns the renderer name for `mode`.
    #[must_use]
    pub fn renderer(&self, mode: RenderMode) -> String {
        self.renderer.renderer(mode)
    }

    /// Returns the mapper between stored and form values.
    #[must_use]
    pub fn value_mapper(&self) -> ValueMapper {
        self.renderer.value_mapper()
    }

    /// Returns the placement string as given.
    #[must_use]
    pub fn placement_text(&self) -> &str {
        &self.placement_text
    }

    /// Returns the parsed placement.
    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Returns the default value, if declared.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Returns the referenced type id for enumerated fields.
    #[must_use]
    pub fn ref_type(&self) -> Option<&str> {
        self.ref_type.as_deref()
    }

    /// Returns the field read from a referenced entity (`Value_field` mode).
    #[must_use]
    pub fn ref_field(&self) -> Option<&str> {
        self.ref_field.as_deref()
    }

    /// Returns the selector restricting enumerated choices.
    #[must_use]
    pub fn ref_restriction(&self) -> &str {
        &self.ref_restriction
    }

    /// Returns the type of entity this field applies to, if declared.
    #[must_use]
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Returns the legacy group reference, if any.
    #[must_use]
    pub fn group_ref(&self) -> Option<&str> {
        self.group_ref.as_deref()
    }

    /// Returns the enumerated choices, if this field references a type.
    #[must_use]
    pub fn choices(&self) -> Option<&[FieldChoice]> {
        self.choices.as_deref()
    }

    /// Returns the view link for choice `id`.
    #[must_use]
    pub fn choice_link(&self, id: &str) -> Option<&str> {
        self.choices
            .as_deref()?
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.link.as_deref())
    }

    /// Returns the nested fields of a group field.
    #[must_use]
    pub fn group(&self) -> Option<&FieldGroup> {
        self.group.as_ref()
    }

    /// Returns the declared subproperties of this field's property.
    #[must_use]
    pub fn subproperty_uris(&self) -> &[String] {
        &self.subproperty_uris
    }

    /// Returns the duplicate suffix index (0 when the property is not duplicated).
    #[must_use]
    pub fn suffix_index(&self) -> usize {
        self.suffix_index
    }

    /// Returns true if the value is a repeated group of sub-field values.
    #[must_use]
    pub fn is_repeat_group(&self) -> bool {
        is_repeat_render_type(self.render_type())
    }

    /// Returns true if this field selects among entities of `ref_type`.
    #[must_use]
    pub fn is_enum_field(&self) -> bool {
        is_enum_render_type(self.render_type())
    }

    /// Returns true if the field offers a control creating a referenced entity.
    #[must_use]
    pub fn has_new_button(&self) -> bool {
        self.ref_type.is_some()
    }

    /// Returns true for URI import fields.
    #[must_use]
    pub fn is_import_field(&self) -> bool {
        self.value_mode == value_mode::IMPORT
    }

    /// Returns true for file upload fields.
    #[must_use]
    pub fn is_upload_field(&self) -> bool {
        self.value_mode == value_mode::UPLOAD
    }

    /// Returns true if the field carries nested field descriptions.
    #[must_use]
    pub fn has_field_list(&self) -> bool {
        self.group.is_some()
    }

    /// Returns the key holding this field's value in `values`.
    ///
    /// When the declared property is absent and a subproperty is present,
    /// the subproperty is used.
    #[must_use]
    pub fn field_value_key<'a>(&'a self, values: &EntityValues) -> &'a str {
        if !values.contains_key(&self.property_uri) {
            if let Some(alt) = self.subproperty_uris.iter().find(|k| values.contains_key(*k)) {
                return alt;
            }
        }
        &self.property_uri
    }

    /// Gives this field a distinct form name and property key when either is
    /// already used by an earlier field of the same view.
    pub fn resolve_duplicates(&mut self, seen: &mut SeenProperties) {
        if seen.names.contains(&self.field_name) || seen.properties.contains(&self.property_uri) {
            let mut i = 1;
            let mut suffix = String::new();
            while seen.names.contains(&format!("{}{suffix}", self.field_name))
                || seen.properties.contains(&format!("{}{suffix}", self.property_uri))
            {
                i += 1;
                suffix = format!("__{i}");
            }
            warn!(
                field_id = %self.field_id,
                property_uri = %self.property_uri,
                suffix = %suffix,
                "duplicate property in view"
            );
            self.suffix_index = i;
            self.field_name.push_str(&suffix);
            self.instance_name = self.field_name.clone();
            self.property_uri.push_str(&suffix);
        }
        seen.names.insert(self.field_name.clone());
        seen.properties.insert(self.property_uri.clone());
    }

    /// Returns the description as a JSON object for a rendering context.
    #[must_use]
    pub fn to_context(&self) -> Value {
        let renderers: serde_json::Map<String, Value> = RenderMode::ALL
            .iter()
            .map(|m| (m.as_str().to_string(), json!(self.renderer(*m))))
            .collect();
        let mut ctx = json!({
            "field_id": self.field_id,
            "field_name": self.field_name,
            "field_instance_name": self.instance_name,
            "field_label": self.label,
            "field_help": self.help,
            "field_placeholder": self.placeholder,
            "field_tooltip": self.field_tooltip(),
            "field_property_uri": self.property_uri,
            "field_value_type": self.value_type,
            "field_value_mode": self.value_mode,
            "field_render_type": self.render_type(),
            "field_renderers": renderers,
            "field_placement": self.placement,
            "field_default_value": self.default_value,
            "field_ref_type": self.ref_type,
            "field_ref_field": self.ref_field,
            "field_ref_restriction": self.ref_restriction,
            "field_entity_type": self.entity_type,
            "field_group_ref": self.group_ref,
            "field_choices": self.choices,
        });
        if let (Some(g), Value::Object(map)) = (&self.group, &mut ctx) {
            map.insert("group_id".into(), json!(g.group_id));
            map.insert("group_label".into(), json!(g.label));
            map.insert("group_add_label".into(), json!(g.add_label));
            map.insert("group_delete_label".into(), json!(g.delete_label));
        }
        ctx
    }
}

/// Builds field descriptions for the views of one collection.
pub struct FieldDescriber<'a> {
    coll: &'a Collection,
    view_context: SelectorContext,
    properties: PropertyHierarchy,
}

impl<'a> FieldDescriber<'a> {
    /// Prepares to describe fields of `coll`.
    ///
    /// `view_context` is visible to choice restriction selectors (for example
    /// `{"view": <view record>}`).
    pub fn new(coll: &'a Collection, view_context: SelectorContext) -> StoreResult<Self> {
        let fields = coll.fields(Scope::All)?;
        let properties = PropertyHierarchy::from_fields(fields.iter().filter_map(|f| f.values()));
        Ok(Self {
            coll,
            view_context,
            properties,
        })
    }

    /// Describes every field reference of a view, resolving duplicate properties.
    ///
    /// # Errors
    /// `RecursiveField` if a group contains itself; store errors from lookups.
    pub fn describe_fields(&self, field_refs: &[Value]) -> StoreResult<Vec<FieldDescription>> {
        let mut seen = SeenProperties::default();
        let mut out = Vec::with_capacity(field_refs.len());
        for fref in field_refs {
            let mut desc = self.describe(fref)?;
            desc.resolve_duplicates(&mut seen);
            out.push(desc);
        }
        Ok(out)
    }

    /// Describes one field reference.
    pub fn describe(&self, field_ref: &Value) -> StoreResult<FieldDescription> {
        self.describe_ref(field_ref, &[])
    }

    fn field_values(&self, field_id: &str) -> StoreResult<EntityValues> {
        if let Some(values) = self.coll.get_field(field_id)?.and_then(|f| f.into_values()) {
            return Ok(values);
        }
        warn!(field_id, coll_id = self.coll.id(), "no definition for field");
        let mut values = self
            .coll
            .get_field(MISSING_FIELD_ID)?
            .and_then(|f| f.into_values())
            .unwrap_or_else(|| {
                let mut v = EntityValues::new();
                v.insert(annal::FIELD_RENDER_TYPE.to_string(), json!("Text"));
                v.insert(annal::FIELD_VALUE_MODE.to_string(), json!(value_mode::DIRECT));
                v
            });
        values.insert(annal::ID.to_string(), json!(field_id));
        values.insert(
            rdfs::LABEL.to_string(),
            json!(format!("Missing field definition for {field_id}")),
        );
        Ok(values)
    }

    fn group_fields(&self, field_id: &str, record: &EntityValues) -> StoreResult<Option<(String, Vec<Value>)>> {
        if let Some(Value::Array(list)) = record.get(annal::FIELD_FIELDS) {
            if !list.is_empty() {
                return Ok(Some((field_id.to_string(), list.clone())));
            }
        }
        let Some(group_id) = ref_id(record, annal::GROUP_REF) else {
            return Ok(None);
        };
        let group = self.coll.get_group(&group_id)?;
        match group.as_ref().and_then(|g| g.get(annal::GROUP_FIELDS)) {
            Some(Value::Array(list)) => Ok(Some((group_id, list.clone()))),
            _ => {
                warn!(field_id, group_id = %group_id, "field group not found");
                Ok(None)
            }
        }
    }

    fn choices(&self, ref_type: &str, restriction: &str, render_type: &str, placeholder: &str) -> StoreResult<Vec<FieldChoice>> {
        let finder = EntityFinder::new(self.coll, Some(restriction))?;
        let mut query = FinderQuery::new().with_type(ref_type).with_scope(Scope::Select);
        query.context = self.view_context.clone();
        let mut choices = Vec::new();
        if OPTIONAL_ENUM_RENDER_TYPES.contains(&render_type) {
            choices.push(FieldChoice {
                id: String::new(),
                label: placeholder.to_string(),
                link: None,
            });
        }
        for e in finder.get_entities_sorted(&query)? {
            if e.id() == INITIAL_VALUES_ID {
                continue;
            }
            choices.push(FieldChoice {
                id: e.type_entity_id(),
                label: e.label().to_string(),
                link: Some(e.view_url_path()),
            });
        }
        debug!(ref_type, count = choices.len(), "field choices");
        Ok(choices)
    }

    fn describe_ref(&self, field_ref: &Value, seen_ids: &[String]) -> StoreResult<FieldDescription> {
        let field_id = field_ref
            .get(annal::FIELD_ID)
            .and_then(Value::as_str)
            .map_or("", extract_entity_id);
        let record = self.field_values(field_id)?;
        let override_str = |key: &str| {
            field_ref
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let field_id = str_value(&record, annal::ID).unwrap_or(field_id).to_string();
        let field_name = str_value(&record, annal::FIELD_NAME)
            .filter(|s| !s.is_empty())
            .unwrap_or(&field_id)
            .to_string();
        let property_uri = override_str(annal::PROPERTY_URI)
            .or_else(|| str_value(&record, annal::PROPERTY_URI).map(str::to_string))
            .unwrap_or_default();
        let placement_text = override_str(annal::FIELD_PLACEMENT)
            .or_else(|| str_value(&record, annal::FIELD_PLACEMENT).map(str::to_string))
            .unwrap_or_default();
        let render_type = ref_id(&record, annal::FIELD_RENDER_TYPE).unwrap_or_else(|| "Text".to_string());
        let value_mode = ref_id(&record, annal::FIELD_VALUE_MODE).unwrap_or_else(|| value_mode::DIRECT.to_string());
        let label = str_value(&record, rdfs::LABEL).unwrap_or("").to_string();
        let placeholder = str_value(&record, annal::PLACEHOLDER).unwrap_or("").to_string();
        let ref_type = ref_id(&record, annal::FIELD_REF_TYPE);
        let ref_restriction = str_value(&record, annal::FIELD_REF_RESTRICTION)
            .unwrap_or("ALL")
            .to_string();

        let choices = match &ref_type {
            Some(t) => Some(self.choices(t, &ref_restriction, &render_type, &placeholder)?),
            None => None,
        };

        let group = match self.group_fields(&field_id, &record)? {
            Some((group_id, field_list)) => {
                if seen_ids.contains(&field_id) {
                    return Err(ValidationError::RecursiveField { field_id }.into());
                }
                let mut seen: Vec<String> = seen_ids.to_vec();
                seen.push(field_id.clone());
                let fields = field_list
                    .iter()
                    .map(|f| self.describe_ref(f, &seen))
                    .collect::<StoreResult<Vec<_>>>()?;
                Some(FieldGroup {
                    group_id,
                    label: label.clone(),
                    add_label: str_value(&record, annal::REPEAT_LABEL_ADD)
                        .filter(|s| !s.is_empty())
                        .map_or_else(|| format!("Add {field_id}"), str::to_string),
                    delete_label: str_value(&record, annal::REPEAT_LABEL_DELETE)
                        .filter(|s| !s.is_empty())
                        .map_or_else(|| format!("Remove {field_id}"), str::to_string),
                    field_list,
                    fields,
                })
            }
            None => None,
        };

        Ok(FieldDescription {
            subproperty_uris: self.properties.subproperty_uris(&property_uri),
            instance_name: field_name.clone(),
            field_name,
            label,
            help: str_value(&record, rdfs::COMMENT).unwrap_or("").to_string(),
            placeholder,
            tooltip: str_value(&record, annal::TOOLTIP).unwrap_or("").to_string(),
            property_uri,
            value_type: str_value(&record, annal::FIELD_VALUE_TYPE).unwrap_or("").to_string(),
            renderer: FieldRenderer::new(&render_type, &value_mode),
            value_mode,
            placement: Placement::parse(&placement_text),
            placement_text,
            default_value: record.get(annal::DEFAULT_VALUE).filter(|v| !v.is_null()).cloned(),
            ref_type,
            ref_field: ref_id(&record, annal::FIELD_REF_FIELD),
            ref_restriction,
            entity_type: str_value(&record, annal::FIELD_ENTITY_TYPE).map(str::to_string),
            group_ref: ref_id(&record, annal::GROUP_REF),
            choices,
            group,
            suffix_index: 0,
            field_id,
        })
    }
}
