//! Entity listing across a type hierarchy.
//!
//! A listing runs in stages: collect the candidate types (a root type and
//! every type declaring it as a transitive supertype), enumerate their
//! entities, drop `_initial_values` templates, then apply the compiled
//! selector and an optional free-text search.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::entity::{Entity, EntityValues, Kind, Scope};
use crate::error::StoreResult;
use crate::layout::{BUILTIN_TYPE_IDS, INITIAL_VALUES_ID};
use crate::model::{Collection, RecordType, TypeInfo};

use super::selector::{EntityComparator, Selector, SelectorContext};

/// Supertype relation between the types of one collection, keyed by type URI.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    /// `(type_id, type_uri)` in listing order.
    types: Vec<(String, String)>,
    supertypes: HashMap<String, Vec<String>>,
}

impl TypeHierarchy {
    /// Builds the hierarchy from loaded type records.
    #[must_use]
    pub fn from_types(types: &[RecordType]) -> Self {
        let mut out = Self::default();
        for t in types {
            let Some(uri) = t.type_uri() else { continue };
            out.types.push((t.id().to_string(), uri.to_string()));
            out.supertypes
                .entry(uri.to_string())
                .or_default()
                .extend(t.supertype_uris().into_iter().map(str::to_string));
        }
        out
    }

    /// Returns every transitive supertype URI of `type_uri` (not including itself).
    #[must_use]
    pub fn supertypes(&self, type_uri: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut pending = vec![type_uri.to_string()];
        while let Some(uri) = pending.pop() {
            for st in self.supertypes.get(&uri).into_iter().flatten() {
                if st != type_uri && seen.insert(st.clone()) {
                    pending.push(st.clone());
                }
            }
        }
        seen
    }

    /// Returns the ids of types that are (transitive) subtypes of `type_uri`,
    /// excluding any type whose own URI is `type_uri`.
    #[must_use]
    pub fn subtype_ids(&self, type_uri: &str) -> Vec<String> {
        self.types
            .iter()
            .filter(|(_, uri)| uri != type_uri && self.supertypes(uri).contains(type_uri))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl EntityComparator for TypeHierarchy {
    fn subtype(&self, a: &str, b: &str) -> bool {
        a == b || self.supertypes(a).contains(b)
    }
}

/// Parameters of one listing.
#[derive(Debug, Clone, Default)]
pub struct FinderQuery {
    /// Root type; `None` lists every type in the collection.
    pub type_id: Option<String>,
    /// Which parents are consulted.
    pub scope: Scope,
    /// Context objects visible to the selector.
    pub context: SelectorContext,
    /// Free-text filter.
    pub search: Option<String>,
    /// Permissions of the requesting user; `None` skips permission checks.
    pub user_permissions: Option<Vec<String>>,
}

impl FinderQuery {
    /// Creates a query over every type at collection scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the listing to `type_id` and its subtypes.
    #[must_use]
    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    /// Sets the enumeration scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Binds a context object for the selector.
    #[must_use]
    pub fn with_context(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context.insert(name.into(), value);
        self
    }

    /// Sets the free-text search string.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.is_empty()).then_some(search);
        self
    }

    /// Applies list permissions of the requesting user.
    #[must_use]
    pub fn with_user_permissions(mut self, permissions: Vec<String>) -> Self {
        self.user_permissions = Some(permissions);
        self
    }
}

/// Finds entities in a collection.
pub struct EntityFinder {
    coll: Collection,
    selector: Selector,
    hierarchy: TypeHierarchy,
    comparator: Option<Box<dyn EntityComparator + Send + Sync>>,
}

impl fmt::Debug for EntityFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFinder")
            .field("coll_id", &self.coll.id())
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl EntityFinder {
    /// Creates a finder with an optional selector.
    ///
    /// # Errors
    /// `SelectorSyntax` if the selector does not compile.
    pub fn new(coll: &Collection, selector: Option<&str>) -> StoreResult<Self> {
        let selector = Selector::from_option(selector)?;
        let hierarchy = TypeHierarchy::from_types(&coll.types(Scope::All)?);
        Ok(Self {
            coll: coll.clone(),
            selector,
            hierarchy,
            comparator: None,
        })
    }

    /// Creates a finder whose selector may use the comparator's extra operators.
    ///
    /// The comparator also replaces the collection's type hierarchy for `subtype`.
    ///
    /// # Errors
    /// `SelectorSyntax` if the selector does not compile.
    pub fn with_comparator(
        coll: &Collection,
        selector: Option<&str>,
        comparator: Box<dyn EntityComparator + Send + Sync>,
    ) -> StoreResult<Self> {
        let selector = match selector {
            Some(s) => Selector::parse_with(s, comparator.operators())?,
            None => Selector::all(),
        };
        let mut finder = Self::new(coll, None)?;
        finder.selector = selector;
        finder.comparator = Some(comparator);
        Ok(finder)
    }

    /// Returns the compiled selector.
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Returns the collection's type hierarchy.
    #[must_use]
    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    fn comparator(&self) -> &dyn EntityComparator {
        match &self.comparator {
            Some(c) => c.as_ref(),
            None => &self.hierarchy,
        }
    }

    /// Returns every type id with entities in the collection: built-in types
    /// first, then declared types and any type data containers.
    pub fn collection_type_ids(&self, scope: Scope) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = BUILTIN_TYPE_IDS.iter().map(|s| (*s).to_string()).collect();
        let declared = self.coll.types(scope)?.into_iter().map(|t| t.id().to_string());
        let stored = self.coll.entity().child_ids(&Kind::TypeData, scope)?;
        for id in declared.chain(stored) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Returns `type_id` followed by the ids of all its subtypes.
    pub fn type_ids(&self, type_id: &str) -> StoreResult<Vec<String>> {
        let mut ids = vec![type_id.to_string()];
        let Some(root) = self.coll.get_type(type_id)? else {
            return Ok(ids);
        };
        if let Some(uri) = root.type_uri() {
            for id in self.hierarchy.subtype_ids(uri) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    fn type_entities(&self, type_id: &str, query: &FinderQuery) -> StoreResult<Vec<Entity>> {
        match &query.user_permissions {
            Some(perms) => TypeInfo::new(&self.coll, type_id, false)?.entities(query.scope, Some(perms)),
            None => self.coll.entities(type_id, query.scope),
        }
    }

    fn passes(&self, entity: &Entity, query: &FinderQuery) -> bool {
        if entity.id() == INITIAL_VALUES_ID {
            return false;
        }
        let empty = EntityValues::new();
        let values = entity.values().unwrap_or(&empty);
        if !self.selector.select(values, &query.context, self.comparator()) {
            return false;
        }
        query
            .search
            .as_deref()
            .map_or(true, |s| values.values().any(|v| entity_contains(v, s)))
    }

    /// Returns the entities matching `query`, in type enumeration order.
    pub fn get_entities(&self, query: &FinderQuery) -> StoreResult<Vec<Entity>> {
        let type_ids = match &query.type_id {
            Some(type_id) => self.type_ids(type_id)?,
            None => self.collection_type_ids(query.scope)?,
        };
        let mut out = Vec::new();
        for type_id in &type_ids {
            for entity in self.type_entities(type_id, query)? {
                if self.passes(&entity, query) {
                    out.push(entity);
                }
            }
        }
        debug!(
            coll_id = self.coll.id(),
            types = type_ids.len(),
            found = out.len(),
            selector = self.selector.source(),
            "entity finder"
        );
        Ok(out)
    }

    /// Returns the entities matching `query`, built-in types and entities first,
    /// each group ordered by type id then entity id.
    pub fn get_entities_sorted(&self, query: &FinderQuery) -> StoreResult<Vec<Entity>> {
        let mut entities = self.get_entities(query)?;
        entities.sort_by_cached_key(order_entity_key);
        Ok(entities)
    }
}

/// Sort key placing `_`-prefixed types and entities before user-defined ones.
#[must_use]
pub fn order_entity_key(entity: &Entity) -> (bool, String, bool, String) {
    let type_id = entity.type_id();
    let id = entity.id();
    (
        !type_id.starts_with('_'),
        type_id.to_string(),
        !id.starts_with('_'),
        id.to_string(),
    )
}

/// Returns true if `search` occurs in any string within `value`.
#[must_use]
pub fn entity_contains(value: &Value, search: &str) -> bool {
    match value {
        Value::String(s) => s.contains(search),
        Value::Array(items) => items.iter().any(|v| entity_contains(v, search)),
        Value::Object(map) => map.values().any(|v| entity_contains(v, search)),
        _ => false,
    }
}
