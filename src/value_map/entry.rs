//! Entries of an entity value map.
//!
//! Each entry moves one piece of an entity between three shapes: stored
//! values, a rendering context, and flat form data. Repeated groups are
//! flattened into form keys prefixed `<group>__<n>__`.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::entity::EntityValues;
use crate::field::{BoundField, FieldDescription, SeenProperties, ValueMapper};

use super::padding::{Padding, RowPosition};

/// Flat form data as submitted.
pub type FormData = Map<String, Value>;

/// Context key under which a row lists its cells.
pub const ROW_FIELDS_KEY: &str = "row_fields";

/// Context key under which a repeat group lists its items.
pub const REPEAT_KEY: &str = "repeat";

/// Returns the form key prefix for item `index` of a repeated group.
#[must_use]
pub fn repeat_prefix(prefix: &str, group_name: &str, index: usize) -> String {
    format!("{prefix}{group_name}__{index}__")
}

/// Copies a value between a context key, an entity property and a form key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleValueMap {
    /// Context key; the extras are probed under this key.
    pub context_key: String,
    /// Entity property, if the value is stored.
    pub entity_key: Option<String>,
    /// Form key, if the value is read back from a form.
    pub form_key: Option<String>,
}

impl SimpleValueMap {
    /// Creates a simple mapping.
    #[must_use]
    pub fn new(context_key: &str, entity_key: Option<&str>, form_key: Option<&str>) -> Self {
        Self {
            context_key: context_key.to_string(),
            entity_key: entity_key.map(str::to_string),
            form_key: form_key.map(str::to_string),
        }
    }

    fn context_value(&self, values: &EntityValues, extras: &Map<String, Value>) -> Value {
        self.entity_key
            .as_deref()
            .and_then(|e| values.get(e))
            .or_else(|| extras.get(&self.context_key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn form_to_entity(&self, form: &FormData, entity: &mut EntityValues) {
        let (Some(e), Some(f)) = (&self.entity_key, &self.form_key) else {
            return;
        };
        match form.get(f) {
            Some(Value::Null) | None => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(v) => {
                entity.insert(e.clone(), v.clone());
            }
        }
    }
}

/// Binds one field description into the rendering context.
#[derive(Debug, Clone)]
pub struct FieldValueMap {
    desc: FieldDescription,
}

impl FieldValueMap {
    /// Wraps a field description.
    #[must_use]
    pub fn new(desc: FieldDescription) -> Self {
        Self { desc }
    }

    /// Returns the wrapped description.
    #[must_use]
    pub fn description(&self) -> &FieldDescription {
        &self.desc
    }

    fn context(&self, values: &EntityValues, extras: &Map<String, Value>, prefix: &str) -> Value {
        let mut ctx = BoundField::new(&self.desc, values, Some(extras)).to_context();
        if let Value::Object(map) = &mut ctx {
            map.insert(
                "field_instance_name".into(),
                json!(format!("{prefix}{}", self.desc.field_name())),
            );
        }
        ctx
    }

    /// Reads the field from the form into `entity`; returns true if the form key was present.
    fn form_to_entity(&self, form: &FormData, entity: &mut EntityValues, prefix: &str) -> bool {
        if self.desc.property_uri().is_empty() {
            return false;
        }
        let key = self.desc.field_value_key(entity).to_string();
        let mapper = self.desc.value_mapper();
        match form.get(&format!("{prefix}{}", self.desc.field_name())) {
            Some(v) => {
                entity.insert(key, mapper.decode(v));
                true
            }
            None if mapper == ValueMapper::CheckBox => {
                entity.insert(key, Value::Bool(false));
                false
            }
            None => false,
        }
    }
}

/// A row of fields with any padding cells between them.
#[derive(Debug, Clone, Default)]
pub struct FieldRowMap {
    cells: Vec<MapEntry>,
}

impl FieldRowMap {
    /// Returns the cells of the row.
    #[must_use]
    pub fn cells(&self) -> &[MapEntry] {
        &self.cells
    }
}

/// A group of fields repeated for each element of a list-valued property.
#[derive(Debug, Clone)]
pub struct RepeatValuesMap {
    desc: FieldDescription,
    fields: FieldListValueMap,
}

impl RepeatValuesMap {
    /// Builds the map for a repeat-group field.
    #[must_use]
    pub fn new(desc: FieldDescription) -> Self {
        let nested = desc
            .group()
            .map(|g| g.fields.clone())
            .unwrap_or_default();
        Self {
            fields: FieldListValueMap::new(REPEAT_KEY, nested),
            desc,
        }
    }

    /// Returns the group field description.
    #[must_use]
    pub fn description(&self) -> &FieldDescription {
        &self.desc
    }

    /// Returns the map applied to each repeated item.
    #[must_use]
    pub fn fields(&self) -> &FieldListValueMap {
        &self.fields
    }

    fn context(&self, values: &EntityValues, extras: &Map<String, Value>, prefix: &str) -> Value {
        let bound = BoundField::new(&self.desc, values, Some(extras));
        let items: Vec<Value> = match values.get(bound.field_value_key()) {
            Some(Value::Array(items)) => items.clone(),
            Some(v @ Value::Object(_)) => vec![v.clone()],
            _ => Vec::new(),
        };
        let name = self.desc.field_name();
        let repeat: Vec<Value> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_values = item.as_object().cloned().unwrap_or_default();
                let item_prefix = repeat_prefix(prefix, name, i);
                json!({
                    "repeat_index": i,
                    "repeat_prefix": item_prefix,
                    "repeat_bound_fields": self.fields.rows_context(&item_values, extras, &item_prefix),
                })
            })
            .collect();
        let mut ctx = bound.to_context();
        if let Value::Object(map) = &mut ctx {
            map.insert("field_instance_name".into(), json!(format!("{prefix}{name}")));
            map.insert(REPEAT_KEY.into(), Value::Array(repeat));
        }
        ctx
    }

    fn form_to_entity(&self, form: &FormData, entity: &mut EntityValues, prefix: &str) -> bool {
        let key = self.desc.field_value_key(entity).to_string();
        let name = self.desc.field_name();
        let mut items = Vec::new();
        loop {
            let item_prefix = repeat_prefix(prefix, name, items.len());
            let mut item = EntityValues::new();
            if !self.fields.form_item_to_entity(form, &mut item, &item_prefix) {
                break;
            }
            items.push(Value::Object(item));
        }
        debug!(field_id = self.desc.field_id(), count = items.len(), "repeat group from form");
        let found = !items.is_empty();
        entity.insert(key, Value::Array(items));
        found
    }
}

/// A list of field descriptions laid out in rows, with repeat groups between rows.
#[derive(Debug, Clone)]
pub struct FieldListValueMap {
    context_key: String,
    descriptions: Vec<FieldDescription>,
    entries: Vec<MapEntry>,
}

impl FieldListValueMap {
    /// Lays out `descriptions`, giving duplicated properties distinct names.
    #[must_use]
    pub fn new(context_key: &str, mut descriptions: Vec<FieldDescription>) -> Self {
        let mut seen = SeenProperties::default();
        for d in &mut descriptions {
            d.resolve_duplicates(&mut seen);
        }

        let mut entries = Vec::new();
        let mut row = FieldRowMap::default();
        let mut position = RowPosition::default();
        let flush = |row: &mut FieldRowMap, entries: &mut Vec<MapEntry>| {
            if !row.cells.is_empty() {
                entries.push(MapEntry::Row(std::mem::take(row)));
            }
        };
        for desc in &descriptions {
            if desc.is_repeat_group() {
                flush(&mut row, &mut entries);
                position.reset();
                entries.push(MapEntry::Repeat(RepeatValuesMap::new(desc.clone())));
                continue;
            }
            let placed = position.place(desc.placement());
            if placed.next_row {
                flush(&mut row, &mut entries);
            }
            if let Some(pad) = placed.padding {
                row.cells.push(MapEntry::Padding(pad));
            }
            row.cells.push(MapEntry::Field(FieldValueMap::new(desc.clone())));
        }
        flush(&mut row, &mut entries);

        Self {
            context_key: context_key.to_string(),
            descriptions,
            entries,
        }
    }

    /// Returns the context key of the list.
    #[must_use]
    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// Returns the field descriptions in view order.
    #[must_use]
    pub fn descriptions(&self) -> &[FieldDescription] {
        &self.descriptions
    }

    /// Returns the laid-out rows and repeat groups.
    #[must_use]
    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    fn rows_context(&self, values: &EntityValues, extras: &Map<String, Value>, prefix: &str) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|e| e.item_context(values, extras, prefix))
                .collect(),
        )
    }

    fn form_item_to_entity(&self, form: &FormData, entity: &mut EntityValues, prefix: &str) -> bool {
        let mut found = false;
        for e in &self.entries {
            found |= e.form_item_to_entity(form, entity, prefix);
        }
        found
    }
}

/// One entry of an entity value map.
#[derive(Debug, Clone)]
pub enum MapEntry {
    /// Copied between context, entity and form.
    Simple(SimpleValueMap),
    /// Copied into the context only; the stored value is never replaced from a form.
    Stable(SimpleValueMap),
    /// A bound field.
    Field(FieldValueMap),
    /// A repeated group of fields.
    Repeat(RepeatValuesMap),
    /// A layout-only cell.
    Padding(Padding),
    /// A row of fields and padding.
    Row(FieldRowMap),
    /// A list of fields laid out in rows.
    List(FieldListValueMap),
}

impl MapEntry {
    /// Context item for entries rendered in sequence (fields, rows, groups).
    fn item_context(&self, values: &EntityValues, extras: &Map<String, Value>, prefix: &str) -> Value {
        match self {
            Self::Simple(m) | Self::Stable(m) => m.context_value(values, extras),
            Self::Field(f) => f.context(values, extras, prefix),
            Self::Repeat(r) => r.context(values, extras, prefix),
            Self::Padding(p) => json!({
                "field_id": "Field_padding",
                "field_render_type": "Padding",
                "field_placement": p.placement,
            }),
            Self::Row(row) => json!({
                "field_id": "Row_fields",
                "field_render_type": "FieldRow",
                ROW_FIELDS_KEY: row
                    .cells
                    .iter()
                    .map(|c| c.item_context(values, extras, prefix))
                    .collect::<Vec<_>>(),
            }),
            Self::List(list) => list.rows_context(values, extras, prefix),
        }
    }

    /// Adds this entry's projection of `values` to `context`.
    pub fn map_entity_to_context(
        &self,
        values: &EntityValues,
        extras: &Map<String, Value>,
        context: &mut Map<String, Value>,
    ) {
        let key = match self {
            Self::Simple(m) | Self::Stable(m) => m.context_key.clone(),
            Self::List(list) => list.context_key.clone(),
            _ => "fields".to_string(),
        };
        let value = self.item_context(values, extras, "");
        match self {
            Self::Simple(_) | Self::Stable(_) | Self::List(_) => {
                context.insert(key, value);
            }
            _ => {
                let slot = context.entry(key).or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = slot {
                    items.push(value);
                }
            }
        }
    }

    fn form_item_to_entity(&self, form: &FormData, entity: &mut EntityValues, prefix: &str) -> bool {
        match self {
            Self::Simple(m) => {
                m.form_to_entity(form, entity);
                false
            }
            Self::Stable(_) | Self::Padding(_) => false,
            Self::Field(f) => f.form_to_entity(form, entity, prefix),
            Self::Repeat(r) => r.form_to_entity(form, entity, prefix),
            Self::Row(row) => {
                let mut found = false;
                for c in &row.cells {
                    found |= c.form_item_to_entity(form, entity, prefix);
                }
                found
            }
            Self::List(list) => list.form_item_to_entity(form, entity, prefix),
        }
    }

    /// Writes form values covered by this entry into `entity`.
    pub fn map_form_to_entity(&self, form: &FormData, entity: &mut EntityValues) {
        self.form_item_to_entity(form, entity, "");
    }

    /// Returns a short description of the entry's structure.
    #[must_use]
    pub fn structure(&self) -> Value {
        match self {
            Self::Simple(m) | Self::Stable(m) => json!({
                "field_type": if matches!(self, Self::Simple(_)) { "SimpleValueMap" } else { "StableValueMap" },
                "context_field": m.context_key,
                "entity_field": m.entity_key,
                "form_field": m.form_key,
            }),
            Self::Field(f) => json!({
                "field_type": "FieldValueMap",
                "field_id": f.desc.field_id(),
                "entity_field": f.desc.property_uri(),
                "form_field": f.desc.field_name(),
            }),
            Self::Repeat(r) => json!({
                "field_type": "RepeatValuesMap",
                "field_id": r.desc.field_id(),
                "entity_field": r.desc.property_uri(),
                "field_list": r.fields.entries.iter().map(Self::structure).collect::<Vec<_>>(),
            }),
            Self::Padding(p) => json!({
                "field_type": "Padding",
                "field_placement": p.placement.field,
            }),
            Self::Row(row) => json!({
                "field_type": "FieldRowValueMap",
                "field_list": row.cells.iter().map(Self::structure).collect::<Vec<_>>(),
            }),
            Self::List(list) => json!({
                "field_type": "FieldListValueMap",
                "context_field": list.context_key,
                "field_list": list.entries.iter().map(Self::structure).collect::<Vec<_>>(),
            }),
        }
    }
}
