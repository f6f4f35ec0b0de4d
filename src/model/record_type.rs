//! Record type definitions.

use serde_json::Value;

use crate::entity::Entity;
use crate::util::ident::extract_entity_id;
use crate::vocab::annal;

/// View used for a type that names none.
pub const DEFAULT_VIEW_ID: &str = "Default_view";
/// List used for a type that names none.
pub const DEFAULT_LIST_ID: &str = "Default_list";

/// A loaded `_type` record.
#[derive(Debug, Clone)]
pub struct RecordType {
    entity: Entity,
}

/// An alias copying one property into another when the target is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAlias {
    /// Property that receives the value.
    pub target: String,
    /// Property the value is copied from.
    pub source: String,
}

impl RecordType {
    /// Wraps a loaded type entity.
    #[must_use]
    pub fn new(entity: Entity) -> Self {
        Self { entity }
    }

    /// Returns the underlying entity.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Returns the type id (the type record's own id).
    #[must_use]
    pub fn id(&self) -> &str {
        self.entity.id()
    }

    /// Returns the type URI: an explicit `annal:uri`, else the type record URL.
    #[must_use]
    pub fn type_uri(&self) -> Option<&str> {
        self.entity.uri()
    }

    /// Returns the declared supertype URIs (direct only).
    #[must_use]
    pub fn supertype_uris(&self) -> Vec<&str> {
        match self.entity.get(annal::SUPERTYPE_URIS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|st| st.get(annal::SUPERTYPE_URI).and_then(Value::as_str))
                .filter(|uri| !uri.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the type URI followed by its direct supertype URIs.
    #[must_use]
    pub fn all_type_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.type_uri().into_iter().map(str::to_string).collect();
        for st in self.supertype_uris() {
            if !uris.iter().any(|u| u == st) {
                uris.push(st.to_string());
            }
        }
        uris
    }

    fn ref_id(&self, key: &str) -> Option<&str> {
        self.entity
            .get_str(key)
            .map(extract_entity_id)
            .filter(|id| !id.is_empty())
    }

    /// Returns the id of the view used to display entities of this type.
    #[must_use]
    pub fn view_id(&self) -> &str {
        self.ref_id(annal::TYPE_VIEW).unwrap_or(DEFAULT_VIEW_ID)
    }

    /// Returns the id of the list used to enumerate entities of this type.
    #[must_use]
    pub fn list_id(&self) -> &str {
        self.ref_id(annal::TYPE_LIST).unwrap_or(DEFAULT_LIST_ID)
    }

    /// Returns the declared field aliases.
    #[must_use]
    pub fn field_aliases(&self) -> Vec<FieldAlias> {
        let Some(Value::Array(items)) = self.entity.get(annal::FIELD_ALIASES) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|a| {
                let target = a.get(annal::ALIAS_TARGET)?.as_str()?;
                let source = a.get(annal::ALIAS_SOURCE)?.as_str()?;
                Some(FieldAlias {
                    target: target.to_string(),
                    source: source.to_string(),
                })
            })
            .collect()
    }
}
