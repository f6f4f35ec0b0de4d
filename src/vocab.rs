//! Compact URIs (CURIEs) for the vocabularies used in stored records.
//!
//! Properties are grouped by namespace module so call sites read as
//! `annal::TYPE_ID` or `rdfs::LABEL`.

/// Namespace URIs keyed by their conventional prefix.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("annal", "http://purl.org/annalist/2014/#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("prov", "http://www.w3.org/ns/prov#"),
];

/// Expands a CURIE using the built-in namespace table.
///
/// Values that do not use a known prefix are returned unchanged.
#[must_use]
pub fn expand_curie(curie: &str) -> String {
    if let Some((prefix, local)) = curie.split_once(':') {
        if let Some((_, ns)) = NAMESPACES.iter().find(|(p, _)| *p == prefix) {
            return format!("{ns}{local}");
        }
    }
    curie.to_string()
}

/// JSON-LD keywords.
#[allow(missing_docs)]
pub mod jsonld {
    pub const ID: &str = "@id";
    pub const TYPE: &str = "@type";
    pub const CONTEXT: &str = "@context";
    pub const BASE: &str = "@base";
    pub const VOCAB: &str = "@vocab";
    pub const ERROR: &str = "@error";
    pub const MESSAGE: &str = "@message";
    pub const CONTAINER: &str = "@container";
    pub const SET: &str = "@set";
    pub const LIST: &str = "@list";
}

/// The `rdfs:` vocabulary.
#[allow(missing_docs)]
pub mod rdfs {
    pub const LABEL: &str = "rdfs:label";
    pub const COMMENT: &str = "rdfs:comment";
}

/// The `prov:` vocabulary.
#[allow(missing_docs)]
pub mod prov {
    pub const GENERATED_AT_TIME: &str = "prov:generatedAtTime";
}

/// The `annal:` vocabulary.
#[allow(missing_docs)]
pub mod annal {
    // Structural properties
    pub const ID: &str = "annal:id";
    pub const TYPE_ID: &str = "annal:type_id";
    pub const TYPE: &str = "annal:type";
    pub const URL: &str = "annal:url";
    pub const URI: &str = "annal:uri";

    // Kind type URIs
    pub const SITE: &str = "annal:Site";
    pub const SITE_DATA: &str = "annal:SiteData";
    pub const COLLECTION: &str = "annal:Collection";
    pub const TYPE_DATA: &str = "annal:Type_Data";
    pub const ENTITY_DATA: &str = "annal:EntityData";
    pub const RECORD_TYPE: &str = "annal:Type";
    pub const RECORD_VIEW: &str = "annal:View";
    pub const RECORD_LIST: &str = "annal:List";
    pub const RECORD_FIELD: &str = "annal:Field";
    pub const FIELD_GROUP: &str = "annal:Field_group";
    pub const USER: &str = "annal:User";
    pub const VOCABULARY: &str = "annal:Vocabulary";
    pub const ENUM: &str = "annal:Enum";

    // Type records
    pub const SUPERTYPE_URIS: &str = "annal:supertype_uris";
    pub const SUPERTYPE_URI: &str = "annal:supertype_uri";

    // View and list records
    pub const VIEW_FIELDS: &str = "annal:view_fields";
    pub const LIST_FIELDS: &str = "annal:list_fields";
    pub const LIST_ENTITY_SELECTOR: &str = "annal:list_entity_selector";
    pub const DISPLAY_TYPE: &str = "annal:display_type";
    pub const RECORD_TYPE_REF: &str = "annal:record_type";
    pub const TYPE_VIEW: &str = "annal:type_view";
    pub const DEFAULT_LIST: &str = "annal:default_list";
    pub const DEFAULT_VIEW: &str = "annal:default_view";
    pub const DEFAULT_TYPE: &str = "annal:default_type";
    pub const TYPE_LIST: &str = "annal:type_list";
    pub const FIELD_ALIASES: &str = "annal:field_aliases";
    pub const ALIAS_TARGET: &str = "annal:alias_target";
    pub const ALIAS_SOURCE: &str = "annal:alias_source";

    // Field records
    pub const FIELD_ID: &str = "annal:field_id";
    pub const FIELD_NAME: &str = "annal:field_name";
    pub const PROPERTY_URI: &str = "annal:property_uri";
    pub const SUPERPROPERTY_URI: &str = "annal:superproperty_uri";
    pub const FIELD_PLACEMENT: &str = "annal:field_placement";
    pub const PLACEHOLDER: &str = "annal:placeholder";
    pub const TOOLTIP: &str = "annal:tooltip";
    pub const FIELD_RENDER_TYPE: &str = "annal:field_render_type";
    pub const FIELD_VALUE_MODE: &str = "annal:field_value_mode";
    pub const FIELD_VALUE_TYPE: &str = "annal:field_value_type";
    pub const DEFAULT_VALUE: &str = "annal:default_value";
    pub const FIELD_REF_TYPE: &str = "annal:field_ref_type";
    pub const FIELD_REF_FIELD: &str = "annal:field_ref_field";
    pub const FIELD_REF_RESTRICTION: &str = "annal:field_ref_restriction";
    pub const FIELD_ENTITY_TYPE: &str = "annal:field_entity_type";
    pub const FIELD_FIELDS: &str = "annal:field_fields";
    pub const GROUP_REF: &str = "annal:group_ref";
    pub const GROUP_FIELDS: &str = "annal:group_fields";
    pub const GROUP_ENTITY_TYPE: &str = "annal:group_entity_type";
    pub const REPEAT_LABEL_ADD: &str = "annal:repeat_label_add";
    pub const REPEAT_LABEL_DELETE: &str = "annal:repeat_label_delete";

    // Superseded field properties
    pub const OPTIONS_TYPEREF: &str = "annal:options_typeref";
    pub const RESTRICT_VALUES: &str = "annal:restrict_values";
    pub const TARGET_FIELD: &str = "annal:target_field";
    pub const FIELD_TARGET_TYPE: &str = "annal:field_target_type";

    // User permissions
    pub const USER_URI: &str = "annal:user_uri";
    pub const USER_PERMISSIONS: &str = "annal:user_permissions";

    // Attached resources
    pub const RESOURCE_NAME: &str = "resource_name";
    pub const RESOURCE_TYPE: &str = "resource_type";
}
