//! A field description bound to one entity's values.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::entity::{Entity, EntityValues, Scope};
use crate::error::StoreResult;
use crate::model::Collection;
use crate::util::urls::{continuation_params, uri_params, uri_with_params};

use super::description::FieldDescription;

/// Keys added to entity values so bound fields can link back to the entity.
pub mod entity_keys {
    /// Entity id.
    pub const ENTITY_ID: &str = "entity_id";
    /// View URL path of the entity.
    pub const ENTITY_LINK: &str = "entity_link";
    /// Type id of the entity.
    pub const ENTITY_TYPE_ID: &str = "entity_type_id";
    /// View URL path of the entity's type record.
    pub const ENTITY_TYPE_LINK: &str = "entity_type_link";
}

/// Extra context key holding the URL of the current request.
pub const REQUEST_URL: &str = "request_url";

/// Text shown in place of options for fields without choices.
pub const NO_OPTIONS: &str = "(no options)";

/// Returns a copy of an entity's values with the link keys of [`entity_keys`] added.
pub fn bound_entity_values(coll: &Collection, entity: &Entity) -> StoreResult<EntityValues> {
    let mut values = entity.values().cloned().unwrap_or_default();
    values.insert(entity_keys::ENTITY_ID.into(), json!(entity.id()));
    values.insert(entity_keys::ENTITY_LINK.into(), json!(entity.view_url_path()));
    values.insert(entity_keys::ENTITY_TYPE_ID.into(), json!(entity.type_id()));
    if let Some(t) = coll.get_entity("_type", entity.type_id(), Scope::All)? {
        values.insert(entity_keys::ENTITY_TYPE_LINK.into(), json!(t.view_url_path()));
    }
    Ok(values)
}

/// A field description paired with the values it renders.
///
/// Reads only: form input flows back through the value map.
#[derive(Debug, Clone, Copy)]
pub struct BoundField<'a> {
    desc: &'a FieldDescription,
    values: &'a EntityValues,
    extras: Option<&'a Map<String, Value>>,
}

impl<'a> BoundField<'a> {
    /// Binds `desc` to `values`, with `extras` supplying values the entity lacks.
    #[must_use]
    pub fn new(
        desc: &'a FieldDescription,
        values: &'a EntityValues,
        extras: Option<&'a Map<String, Value>>,
    ) -> Self {
        Self { desc, values, extras }
    }

    /// Returns the bound description.
    #[must_use]
    pub fn description(&self) -> &'a FieldDescription {
        self.desc
    }

    /// Returns the key under which the value is read.
    #[must_use]
    pub fn field_value_key(&self) -> &'a str {
        self.desc.field_value_key(self.values)
    }

    /// Returns the field value: the entity's, else the extras', else the
    /// field default, else `""`.
    #[must_use]
    pub fn field_value(&self) -> Value {
        let key = self.field_value_key();
        self.values
            .get(key)
            .or_else(|| self.extras.and_then(|x| x.get(key)))
            .filter(|v| !v.is_null())
            .or_else(|| self.desc.default_value())
            .cloned()
            .unwrap_or_else(|| json!(""))
    }

    /// Returns the field value in its form representation.
    #[must_use]
    pub fn encoded_value(&self) -> Value {
        self.desc.value_mapper().encode(&self.field_value())
    }

    fn entity_str(&self, key: &str) -> &'a str {
        self.values.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Returns the id of the bound entity.
    #[must_use]
    pub fn entity_id(&self) -> &'a str {
        self.entity_str(entity_keys::ENTITY_ID)
    }

    /// Returns the view link of the bound entity.
    #[must_use]
    pub fn entity_link(&self) -> &'a str {
        self.entity_str(entity_keys::ENTITY_LINK)
    }

    /// Returns the type id of the bound entity.
    #[must_use]
    pub fn entity_type_id(&self) -> &'a str {
        self.entity_str(entity_keys::ENTITY_TYPE_ID)
    }

    /// Returns the view link of the bound entity's type.
    #[must_use]
    pub fn entity_type_link(&self) -> &'a str {
        self.entity_str(entity_keys::ENTITY_TYPE_LINK)
    }

    /// Returns the URL to return to after following a link from this field.
    #[must_use]
    pub fn continuation_url(&self) -> String {
        let Some(extras) = self.extras else {
            warn!(field_id = self.desc.field_id(), "no extra context for continuation URL");
            return String::new();
        };
        let request_url = extras.get(REQUEST_URL).and_then(Value::as_str).unwrap_or("");
        if request_url.is_empty() {
            return String::new();
        }
        let params: Vec<(String, String)> = extras
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        let cont = continuation_params(&params);
        let cont: Vec<(&str, Option<&str>)> = cont.iter().map(|(k, v)| (*k, v.as_deref())).collect();
        uri_with_params(request_url, &cont)
    }

    fn continuation_param(&self) -> String {
        let cont = self.continuation_url();
        if cont.is_empty() {
            return cont;
        }
        uri_params(&[("continuation_url", Some(&cont))])
    }

    /// Returns the entity link with a continuation parameter.
    #[must_use]
    pub fn entity_link_continuation(&self) -> String {
        format!("{}{}", self.entity_link(), self.continuation_param())
    }

    /// Returns the view link of the chosen entity for enumerated fields.
    #[must_use]
    pub fn field_value_link(&self) -> Option<&'a str> {
        let value = self.field_value();
        self.desc.choice_link(value.as_str()?)
    }

    /// Returns the chosen entity's link with a continuation parameter.
    #[must_use]
    pub fn field_value_link_continuation(&self) -> Option<String> {
        self.field_value_link()
            .map(|link| format!("{link}{}", self.continuation_param()))
    }

    /// Returns the choice labels, or a single placeholder when there are none.
    #[must_use]
    pub fn options(&self) -> Vec<&'a str> {
        match self.desc.choices() {
            Some(choices) => choices.iter().map(|c| c.label.as_str()).collect(),
            None => vec![NO_OPTIONS],
        }
    }

    /// Returns the description context extended with the bound values.
    #[must_use]
    pub fn to_context(&self) -> Value {
        let mut ctx = self.desc.to_context();
        if let Value::Object(map) = &mut ctx {
            map.insert("entity_id".into(), json!(self.entity_id()));
            map.insert("entity_link".into(), json!(self.entity_link()));
            map.insert("entity_type_id".into(), json!(self.entity_type_id()));
            map.insert("entity_type_link".into(), json!(self.entity_type_link()));
            map.insert("continuation_url".into(), json!(self.continuation_url()));
            map.insert("field_value_key".into(), json!(self.field_value_key()));
            map.insert("field_value".into(), self.field_value());
            map.insert("field_value_encoded".into(), self.encoded_value());
            map.insert("field_value_link".into(), json!(self.field_value_link()));
            map.insert("options".into(), json!(self.options()));
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::field::FieldDescriber;
    use crate::finder::SelectorContext;
    use crate::model::Site;
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
        coll.add_field(
            "Entity_comment",
            values(json!({
                "annal:property_uri": "rdfs:comment",
                "annal:field_render_type": "Textarea",
                "annal:default_value": "(none)"
            })),
        )
        .unwrap();
        coll.add_field(
            "Entity_tags",
            values(json!({
                "annal:property_uri": "ex:tags",
                "annal:field_render_type": "TokenSet"
            })),
        )
        .unwrap();
        (dir, coll)
    }

    fn describe(coll: &Collection, id: &str) -> FieldDescription {
        FieldDescriber::new(coll, SelectorContext::new())
            .unwrap()
            .describe(&json!({ "annal:field_id": id }))
            .unwrap()
    }

    #[test]
    fn test_value_lookup_order() {
        let (_dir, coll) = setup();
        let desc = describe(&coll, "Entity_comment");
        let entity = values(json!({"rdfs:comment": "from entity"}));
        let extras = values(json!({"rdfs:comment": "from extras"}));
        assert_eq!(
            BoundField::new(&desc, &entity, Some(&extras)).field_value(),
            json!("from entity")
        );
        let empty = EntityValues::new();
        assert_eq!(
            BoundField::new(&desc, &empty, Some(&extras)).field_value(),
            json!("from extras")
        );
        assert_eq!(BoundField::new(&desc, &empty, None).field_value(), json!("(none)"));

        let tags = describe(&coll, "Entity_tags");
        assert_eq!(BoundField::new(&tags, &empty, None).field_value(), json!(""));
    }

    #[test]
    fn test_encoded_value_uses_mapper() {
        let (_dir, coll) = setup();
        let desc = describe(&coll, "Entity_tags");
        let entity = values(json!({"ex:tags": ["a", "b"]}));
        let bound = BoundField::new(&desc, &entity, None);
        assert_eq!(bound.encoded_value(), json!("a b"));
        assert_eq!(bound.options(), vec![NO_OPTIONS]);
    }

    #[test]
    fn test_entity_links_and_continuation() {
        let (_dir, coll) = setup();
        coll.add_type("t1", EntityValues::new()).unwrap();
        let e = coll
            .type_info("t1")
            .unwrap()
            .create_entity("e1", values(json!({"rdfs:comment": "c"})))
            .unwrap();
        let vals = bound_entity_values(&coll, &e).unwrap();
        let desc = describe(&coll, "Entity_comment");
        let extras = values(json!({
            "request_url": "/annalist/c/testcoll/v/Default_view/t1/e1/?foo=bar",
            "search": "term"
        }));
        let bound = BoundField::new(&desc, &vals, Some(&extras));
        assert_eq!(bound.entity_id(), "e1");
        assert_eq!(bound.entity_type_id(), "t1");
        assert_eq!(bound.entity_link(), "/annalist/c/testcoll/d/t1/e1/");
        assert_eq!(bound.entity_type_link(), "/annalist/c/testcoll/d/_type/t1/");
        assert_eq!(
            bound.continuation_url(),
            "/annalist/c/testcoll/v/Default_view/t1/e1/?search=term"
        );
        assert!(bound.entity_link_continuation().starts_with("/annalist/c/testcoll/d/t1/e1/?continuation_url="));
        assert_eq!(BoundField::new(&desc, &vals, None).continuation_url(), "");
    }

    #[test]
    fn test_context_projection() {
        let (_dir, coll) = setup();
        let desc = describe(&coll, "Entity_tags");
        let entity = values(json!({"ex:tags": ["x"]}));
        let ctx = BoundField::new(&desc, &entity, None).to_context();
        assert_eq!(ctx["field_value"], json!(["x"]));
        assert_eq!(ctx["field_value_encoded"], json!("x"));
        assert_eq!(ctx["field_id"], json!("Entity_tags"));
    }
}
