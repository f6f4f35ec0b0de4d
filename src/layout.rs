//! On-disk and URL layout constants.
//!
//! Every path in the site tree is derived from these templates and the
//! slugs of the entities along the way. Templates use `{id}` and
//! `{type_id}` placeholders, expanded by [`expand_template`].

/// Directory under the configured base data directory that holds the site.
pub const SITE_DIR: &str = "annalist_site";

/// Slug of the collection that carries site-wide data.
pub const SITE_DATA_ID: &str = "_annalist_site";

/// Legacy per-collection metadata directory name.
pub const LEGACY_COLL_DIR: &str = "_annalist_collection";

/// Slug of the template entity hidden from every enumeration.
pub const INITIAL_VALUES_ID: &str = "_initial_values";

/// Slugs that are rejected by `valid_id` unless reserved names are allowed.
pub const RESERVED_IDS: &[&str] = &[LEGACY_COLL_DIR, SITE_DATA_ID];

/// Maximum slug length.
pub const MAX_ID_LEN: usize = 128;

/// Digits in a freshly allocated entity id (`00000001`).
pub const NEW_ID_WIDTH: usize = 8;

/// Site metadata body, relative to the site directory.
pub const SITE_META_FILE: &str = "site_meta.jsonld";

/// Collection directory template relative to the site directory.
pub const COLL_PATH: &str = "c/{id}";
/// Collection metadata body, relative to the collection directory.
pub const COLL_META_FILE: &str = "d/coll_meta.jsonld";
/// Collection provenance file.
pub const COLL_PROV_FILE: &str = "d/coll_prov.jsonld";
/// Collection JSON-LD context file.
pub const COLL_CONTEXT_FILE: &str = "d/coll_context.jsonld";
/// Collection body location used before the `d/` layout.
pub const COLL_LEGACY_META_FILE: &str = "_annalist_collection/coll_meta.jsonld";
/// Relative reference from a collection body to the context file.
pub const COLL_CONTEXT_REF: &str = "coll_context.jsonld";
/// Relative reference from any body under `d/<type>/<id>/` to the collection context.
pub const ENTITY_CONTEXT_REF: &str = "../../coll_context.jsonld";

/// Collection-relative data directory.
pub const COLL_DATA_DIR: &str = "d";

/// Type data container template relative to the collection directory.
pub const TYPEDATA_PATH: &str = "d/{id}";
/// Type data container body (written only for user types).
pub const TYPEDATA_META_FILE: &str = "type_data_meta.jsonld";

/// Entity data template relative to its type data directory.
pub const ENTITY_DATA_PATH: &str = "{id}";
/// Entity data body file.
pub const ENTITY_DATA_FILE: &str = "entity_data.jsonld";
/// Entity data provenance file.
pub const ENTITY_PROV_FILE: &str = "entity_prov.jsonld";
/// Entity data body file used by older releases.
pub const ENTITY_LEGACY_DATA_FILE: &str = "entity-data.jsonld";

/// Enumeration value template relative to the collection directory.
pub const ENUM_PATH: &str = "d/{type_id}/{id}";
/// Enumeration body file.
pub const ENUM_META_FILE: &str = "enum_meta.jsonld";
/// Enumeration provenance file.
pub const ENUM_PROV_FILE: &str = "enum_prov.jsonld";
/// Legacy enumeration template.
pub const ENUM_LEGACY_PATH: &str = "_annalist_collection/enums/{type_id}/{id}";

/// Layout of one metadata kind stored under `d/<type_id>/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaLayout {
    /// Reserved type id.
    pub type_id: &'static str,
    /// Directory template relative to the collection directory.
    pub path: &'static str,
    /// Body file name.
    pub meta_file: &'static str,
    /// Provenance file name.
    pub prov_file: &'static str,
    /// Directory template used before the `d/` layout.
    pub legacy_path: &'static str,
}

/// Record type layout.
pub const TYPE_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_type",
    path: "d/_type/{id}",
    meta_file: "type_meta.jsonld",
    prov_file: "type_prov.jsonld",
    legacy_path: "_annalist_collection/types/{id}",
};

/// Record view layout.
pub const VIEW_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_view",
    path: "d/_view/{id}",
    meta_file: "view_meta.jsonld",
    prov_file: "view_prov.jsonld",
    legacy_path: "_annalist_collection/views/{id}",
};

/// Record list layout.
pub const LIST_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_list",
    path: "d/_list/{id}",
    meta_file: "list_meta.jsonld",
    prov_file: "list_prov.jsonld",
    legacy_path: "_annalist_collection/lists/{id}",
};

/// Record field layout.
pub const FIELD_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_field",
    path: "d/_field/{id}",
    meta_file: "field_meta.jsonld",
    prov_file: "field_prov.jsonld",
    legacy_path: "_annalist_collection/fields/{id}",
};

/// Field group layout.
pub const GROUP_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_group",
    path: "d/_group/{id}",
    meta_file: "group_meta.jsonld",
    prov_file: "group_prov.jsonld",
    legacy_path: "_annalist_collection/groups/{id}",
};

/// User permissions layout.
pub const USER_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_user",
    path: "d/_user/{id}",
    meta_file: "user_meta.jsonld",
    prov_file: "user_prov.jsonld",
    legacy_path: "_annalist_collection/users/{id}",
};

/// Vocabulary namespace layout.
pub const VOCAB_LAYOUT: MetaLayout = MetaLayout {
    type_id: "_vocab",
    path: "d/_vocab/{id}",
    meta_file: "vocab_meta.jsonld",
    prov_file: "vocab_prov.jsonld",
    legacy_path: "_annalist_collection/vocabs/{id}",
};

/// Reserved type ids of the built-in enumerations.
pub const ENUM_TYPE_IDS: &[&str] = &[
    "_enum_bib_type",
    "_enum_field_placement",
    "_enum_list_type",
    "_enum_render_type",
    "_enum_value_mode",
    "_enum_value_type",
];

/// Every built-in type id, in the order they are listed by the finder.
pub const BUILTIN_TYPE_IDS: &[&str] = &[
    "_type",
    "_list",
    "_view",
    "_group",
    "_field",
    "_user",
    "_vocab",
    "_enum_bib_type",
    "_enum_field_placement",
    "_enum_list_type",
    "_enum_render_type",
    "_enum_value_mode",
    "_enum_value_type",
];

/// URL path segment for entity data (`/c/<coll>/d/<type>/<id>/`).
pub const URL_DATA: &str = "d";
/// URL path segment for list displays (`/c/<coll>/l/<list>/`).
pub const URL_LIST: &str = "l";
/// URL path segment for view displays (`/c/<coll>/v/<view>/<type>/<id>/`).
pub const URL_VIEW: &str = "v";

/// Returns true if `type_id` names a built-in enumeration.
#[must_use]
pub fn is_enum_type_id(type_id: &str) -> bool {
    type_id.starts_with("_enum_")
}

/// Expands `{id}` and `{type_id}` placeholders in a layout template.
#[must_use]
pub fn expand_template(template: &str, id: &str, type_id: &str) -> String {
    template.replace("{type_id}", type_id).replace("{id}", id)
}

/// Returns the directory portion of a template with its final segment removed.
///
/// `"d/_type/{id}"` gives `"d/_type"`, and `"{id}"` gives `""`.
#[must_use]
pub fn template_parent(template: &str) -> &str {
    template.rsplit_once('/').map_or("", |(parent, _)| parent)
}
