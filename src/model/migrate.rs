//! Format migrations applied to entity values after load.
//!
//! Every migration is idempotent: applying it to its own output changes
//! nothing. Migrated values are persisted only when the entity is next saved.

use serde_json::Value;
use tracing::{info, warn};

use crate::entity::{EntityValues, Kind};
use crate::util::ident::{extract_entity_id, make_type_entity_id, split_type_entity_id};
use crate::vocab::{annal, rdfs};

const RENDER_TYPE_ENUM: &str = "_enum_render_type";
const VALUE_MODE_ENUM: &str = "_enum_value_mode";
const LIST_TYPE_ENUM: &str = "_enum_list_type";

const FIELD_RENAMES: &[(&str, &str)] = &[
    (annal::OPTIONS_TYPEREF, annal::FIELD_REF_TYPE),
    (annal::RESTRICT_VALUES, annal::FIELD_REF_RESTRICTION),
    (annal::TARGET_FIELD, annal::FIELD_REF_FIELD),
    (annal::FIELD_TARGET_TYPE, annal::FIELD_VALUE_TYPE),
];

const RENDER_TYPE_RENAMES: &[(&str, &str)] = &[
    ("RepeatGroup", "Group_Seq"),
    ("RepeatGroupRow", "Group_Seq_Row"),
    ("Slug", "EntityRef"),
];

const LIST_FIELD_RENAMES: &[(&str, &str)] = &[
    ("Field_render", "_field/Field_render_type"),
    ("Field_type", "_field/Field_value_type"),
];

/// Applies the format migration for `kind`; kinds without one are returned unchanged.
#[must_use]
pub fn migrate_values(kind: &Kind, values: EntityValues) -> EntityValues {
    match kind {
        Kind::Field => migrate_field(values),
        Kind::List => migrate_list(values),
        _ => values,
    }
}

fn rename_properties(values: &mut EntityValues, renames: &[(&str, &str)]) {
    for (old, new) in renames {
        if let Some(v) = values.remove(*old) {
            values.insert((*new).to_string(), v);
        }
    }
}

fn non_empty_str<'a>(values: &'a EntityValues, key: &str) -> Option<&'a str> {
    values.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Rewrites a bare or qualified enumeration value as `enum_type/value`.
fn qualify_enum(values: &mut EntityValues, key: &str, enum_type: &str) {
    if let Some(v) = non_empty_str(values, key) {
        let qualified = make_type_entity_id(enum_type, extract_entity_id(v));
        values.insert(key.to_string(), Value::String(qualified));
    }
}

fn rename_enum_value(values: &mut EntityValues, key: &str, enum_type: &str, old: &str, new: &str) {
    let Some(v) = non_empty_str(values, key) else {
        return;
    };
    let (type_id, value) = split_type_entity_id(Some(v), None);
    if type_id.as_deref() == Some(enum_type) && value.as_deref() == Some(old) {
        values.insert(key.to_string(), Value::String(make_type_entity_id(enum_type, new)));
    }
}

fn migrate_field(mut values: EntityValues) -> EntityValues {
    let field_id = values
        .get(annal::ID)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    rename_properties(&mut values, FIELD_RENAMES);
    qualify_enum(&mut values, annal::FIELD_RENDER_TYPE, RENDER_TYPE_ENUM);
    qualify_enum(&mut values, annal::FIELD_VALUE_MODE, VALUE_MODE_ENUM);

    if values.contains_key(rdfs::COMMENT) && !values.contains_key(annal::TOOLTIP) {
        let comment = values.get(rdfs::COMMENT).cloned().unwrap_or(Value::Null);
        let label = values
            .get(rdfs::LABEL)
            .and_then(Value::as_str)
            .map_or_else(|| format!("Field '{field_id}'"), str::to_string);
        let comment_text = comment.as_str().unwrap_or_default().to_string();
        values.insert(annal::TOOLTIP.to_string(), comment);
        values.insert(
            rdfs::COMMENT.to_string(),
            Value::String(format!("# {label}\r\n\r\n{comment_text}")),
        );
    }

    if non_empty_str(&values, annal::FIELD_RENDER_TYPE).is_none() {
        values.insert(
            annal::FIELD_RENDER_TYPE.to_string(),
            Value::String(make_type_entity_id(RENDER_TYPE_ENUM, "Text")),
        );
    }
    for (old, new) in RENDER_TYPE_RENAMES {
        rename_enum_value(&mut values, annal::FIELD_RENDER_TYPE, RENDER_TYPE_ENUM, old, new);
    }

    let render = non_empty_str(&values, annal::FIELD_RENDER_TYPE)
        .map(|r| extract_entity_id(r).to_string())
        .unwrap_or_default();
    let has_ref_type = non_empty_str(&values, annal::FIELD_REF_TYPE).is_some();
    let has_ref_field = non_empty_str(&values, annal::FIELD_REF_FIELD).is_some();

    if non_empty_str(&values, annal::FIELD_VALUE_MODE).is_none() {
        let mode = if has_ref_type && has_ref_field {
            "Value_field"
        } else {
            match render.as_str() {
                "RefMultifield" => "Value_entity",
                "URIImport" => "Value_import",
                "FileUpload" => "Value_upload",
                _ => "Value_direct",
            }
        };
        info!(field_id, mode, "deriving field value mode");
        values.insert(
            annal::FIELD_VALUE_MODE.to_string(),
            Value::String(make_type_entity_id(VALUE_MODE_ENUM, mode)),
        );
    }

    let mode = non_empty_str(&values, annal::FIELD_VALUE_MODE)
        .map(|m| extract_entity_id(m).to_string())
        .unwrap_or_default();
    match mode.as_str() {
        "Value_field" if !(has_ref_type && has_ref_field) => {
            warn!(field_id, "value mode Value_field requires a reference type and field");
        }
        "Value_entity" if !has_ref_type => {
            warn!(field_id, "value mode Value_entity requires a reference type");
        }
        "Value_entity" if has_ref_field => {
            warn!(field_id, "value mode Value_entity should not name a reference field");
        }
        _ => {}
    }
    values
}

fn migrate_list(mut values: EntityValues) -> EntityValues {
    qualify_enum(&mut values, annal::DISPLAY_TYPE, LIST_TYPE_ENUM);
    if let Some(Value::Array(fields)) = values.get_mut(annal::LIST_FIELDS) {
        for field in fields.iter_mut().filter_map(Value::as_object_mut) {
            let Some(field_ref) = field.get(annal::FIELD_ID).and_then(Value::as_str) else {
                continue;
            };
            let field_id = extract_entity_id(field_ref);
            if let Some((_, new)) = LIST_FIELD_RENAMES.iter().find(|(old, _)| *old == field_id) {
                field.insert(annal::FIELD_ID.to_string(), Value::String((*new).to_string()));
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> EntityValues {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_field_property_renames() {
        let v = migrate_values(
            &Kind::Field,
            obj(json!({
                "annal:id": "f1",
                "annal:options_typeref": "t1",
                "annal:restrict_values": "ALL",
                "annal:field_target_type": "annal:Text"
            })),
        );
        assert_eq!(v["annal:field_ref_type"], json!("t1"));
        assert_eq!(v["annal:field_ref_restriction"], json!("ALL"));
        assert_eq!(v["annal:field_value_type"], json!("annal:Text"));
        assert!(!v.contains_key("annal:options_typeref"));
        assert_eq!(v["annal:field_render_type"], json!("_enum_render_type/Text"));
        assert_eq!(v["annal:field_value_mode"], json!("_enum_value_mode/Value_direct"));
    }

    #[test]
    fn test_field_render_type_renames() {
        let v = migrate_values(
            &Kind::Field,
            obj(json!({"annal:id": "f", "annal:field_render_type": "RepeatGroupRow"})),
        );
        assert_eq!(v["annal:field_render_type"], json!("_enum_render_type/Group_Seq_Row"));

        let v = migrate_values(
            &Kind::Field,
            obj(json!({"annal:id": "f", "annal:field_render_type": "_enum_render_type/Slug"})),
        );
        assert_eq!(v["annal:field_render_type"], json!("_enum_render_type/EntityRef"));
    }

    #[test]
    fn test_field_value_mode_derivation() {
        let cases = [
            (json!({"annal:field_ref_type": "t", "annal:field_ref_field": "p:x"}), "Value_field"),
            (json!({"annal:field_render_type": "RefMultifield", "annal:field_ref_type": "t"}), "Value_entity"),
            (json!({"annal:field_render_type": "URIImport"}), "Value_import"),
            (json!({"annal:field_render_type": "FileUpload"}), "Value_upload"),
            (json!({"annal:field_value_mode": "Value_upload"}), "Value_upload"),
        ];
        for (input, mode) in cases {
            let v = migrate_values(&Kind::Field, obj(input));
            assert_eq!(v["annal:field_value_mode"], json!(format!("_enum_value_mode/{mode}")));
        }
    }

    #[test]
    fn test_field_comment_becomes_tooltip() {
        let v = migrate_values(
            &Kind::Field,
            obj(json!({"annal:id": "f", "rdfs:label": "Title", "rdfs:comment": "The title"})),
        );
        assert_eq!(v["annal:tooltip"], json!("The title"));
        assert_eq!(v["rdfs:comment"], json!("# Title\r\n\r\nThe title"));
    }

    #[test]
    fn test_list_migration() {
        let v = migrate_values(
            &Kind::List,
            obj(json!({
                "annal:display_type": "List",
                "annal:list_fields": [
                    {"annal:field_id": "Field_render"},
                    {"annal:field_id": "_field/Field_type"},
                    {"annal:field_id": "Entity_id"}
                ]
            })),
        );
        assert_eq!(v["annal:display_type"], json!("_enum_list_type/List"));
        assert_eq!(v["annal:list_fields"][0]["annal:field_id"], json!("_field/Field_render_type"));
        assert_eq!(v["annal:list_fields"][1]["annal:field_id"], json!("_field/Field_value_type"));
        assert_eq!(v["annal:list_fields"][2]["annal:field_id"], json!("Entity_id"));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let inputs = [
            (Kind::Field, json!({"annal:id": "f", "rdfs:comment": "c", "annal:target_field": "p:x", "annal:options_typeref": "t"})),
            (Kind::Field, json!({"annal:id": "g", "annal:field_render_type": "RepeatGroup"})),
            (Kind::List, json!({"annal:display_type": "Grid", "annal:list_fields": [{"annal:field_id": "Field_type"}]})),
            (Kind::Type, json!({"rdfs:label": "unchanged"})),
        ];
        for (kind, input) in inputs {
            let once = migrate_values(&kind, obj(input));
            let twice = migrate_values(&kind, once.clone());
            assert_eq!(once, twice, "{kind}");
        }
    }
}
