//! Entity kinds and their layout constants.

use std::fmt;

use crate::layout::{self, MetaLayout};
use crate::vocab::annal;

/// Static layout and typing constants shared by every entity of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDef {
    /// Human-readable kind name used in log output.
    pub name: &'static str,
    /// Semantic type URI (CURIE) always present in stored `@type`.
    pub type_uri: &'static str,
    /// Reserved type id, or `""` when the kind carries its own.
    pub type_id: &'static str,
    /// Entity directory relative to the parent directory.
    pub path: &'static str,
    /// Entity directory relative to the parent's alternate directory.
    pub alt_path: Option<&'static str>,
    /// Entity directory used by older releases.
    pub legacy_path: Option<&'static str>,
    /// View URL relative to the parent URL.
    pub view_path: &'static str,
    /// Body file relative to the entity directory.
    pub body_file: &'static str,
    /// Provenance file relative to the entity directory.
    pub prov_file: Option<&'static str>,
    /// Body file names used by older releases.
    pub legacy_body_files: &'static [&'static str],
    /// Reference to the entity stored as `@id`.
    pub self_ref: &'static str,
    /// Reference from the body file to the collection data directory (`@base`).
    pub base_ref: &'static str,
    /// Reference from the body file to the collection context.
    pub context_ref: &'static str,
}

const fn meta_def(name: &'static str, type_uri: &'static str, l: MetaLayout, view_path: &'static str) -> KindDef {
    KindDef {
        name,
        type_uri,
        type_id: l.type_id,
        path: l.path,
        alt_path: Some(l.path),
        legacy_path: Some(l.legacy_path),
        view_path,
        body_file: l.meta_file,
        prov_file: Some(l.prov_file),
        legacy_body_files: &[],
        self_ref: "../",
        base_ref: "../../",
        context_ref: layout::ENTITY_CONTEXT_REF,
    }
}

static SITE_DEF: KindDef = KindDef {
    name: "Site",
    type_uri: annal::SITE,
    type_id: "_site",
    path: "",
    alt_path: None,
    legacy_path: None,
    view_path: "",
    body_file: layout::SITE_META_FILE,
    prov_file: None,
    legacy_body_files: &[],
    self_ref: "./",
    base_ref: "./",
    context_ref: "c/_annalist_site/d/coll_context.jsonld",
};

static COLLECTION_DEF: KindDef = KindDef {
    name: "Collection",
    type_uri: annal::COLLECTION,
    type_id: "_coll",
    path: layout::COLL_PATH,
    alt_path: None,
    legacy_path: None,
    view_path: "c/{id}/",
    body_file: layout::COLL_META_FILE,
    prov_file: Some(layout::COLL_PROV_FILE),
    legacy_body_files: &[layout::COLL_LEGACY_META_FILE],
    self_ref: "../",
    base_ref: "./",
    context_ref: layout::COLL_CONTEXT_REF,
};

static TYPE_DEF: KindDef = meta_def("RecordType", annal::RECORD_TYPE, layout::TYPE_LAYOUT, "d/_type/{id}/");
static VIEW_DEF: KindDef = meta_def("RecordView", annal::RECORD_VIEW, layout::VIEW_LAYOUT, "d/_view/{id}/");
static LIST_DEF: KindDef = meta_def("RecordList", annal::RECORD_LIST, layout::LIST_LAYOUT, "d/_list/{id}/");
static FIELD_DEF: KindDef = meta_def("RecordField", annal::RECORD_FIELD, layout::FIELD_LAYOUT, "d/_field/{id}/");
static GROUP_DEF: KindDef = meta_def("RecordGroup", annal::FIELD_GROUP, layout::GROUP_LAYOUT, "d/_group/{id}/");
static USER_DEF: KindDef = meta_def("AnnalistUser", annal::USER, layout::USER_LAYOUT, "d/_user/{id}/");
static VOCAB_DEF: KindDef = meta_def("RecordVocab", annal::VOCABULARY, layout::VOCAB_LAYOUT, "d/_vocab/{id}/");

static ENUM_DEF: KindDef = KindDef {
    name: "RecordEnum",
    type_uri: annal::ENUM,
    type_id: "",
    path: layout::ENUM_PATH,
    alt_path: Some(layout::ENUM_PATH),
    legacy_path: Some(layout::ENUM_LEGACY_PATH),
    view_path: "d/{type_id}/{id}/",
    body_file: layout::ENUM_META_FILE,
    prov_file: Some(layout::ENUM_PROV_FILE),
    legacy_body_files: &[],
    self_ref: "../",
    base_ref: "../../",
    context_ref: layout::ENTITY_CONTEXT_REF,
};

static TYPEDATA_DEF: KindDef = KindDef {
    name: "RecordTypeData",
    type_uri: annal::TYPE_DATA,
    type_id: "_typedata",
    path: layout::TYPEDATA_PATH,
    alt_path: Some(layout::TYPEDATA_PATH),
    legacy_path: None,
    view_path: "d/{id}/",
    body_file: layout::TYPEDATA_META_FILE,
    prov_file: None,
    legacy_body_files: &[],
    self_ref: "../",
    base_ref: "../",
    context_ref: "../coll_context.jsonld",
};

static ENTITY_DATA_DEF: KindDef = KindDef {
    name: "EntityData",
    type_uri: annal::ENTITY_DATA,
    type_id: "",
    path: layout::ENTITY_DATA_PATH,
    alt_path: Some(layout::ENTITY_DATA_PATH),
    legacy_path: None,
    view_path: "{id}/",
    body_file: layout::ENTITY_DATA_FILE,
    prov_file: Some(layout::ENTITY_PROV_FILE),
    legacy_body_files: &[layout::ENTITY_LEGACY_DATA_FILE],
    self_ref: "../",
    base_ref: "../../",
    context_ref: layout::ENTITY_CONTEXT_REF,
};

/// The kind of an entity, fixing where it lives and how it is typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The site root.
    Site,
    /// A collection, child of the site.
    Collection,
    /// A record type definition (`_type`).
    Type,
    /// A record view definition (`_view`).
    View,
    /// A record list definition (`_list`).
    List,
    /// A field definition (`_field`).
    Field,
    /// A field group definition (`_group`).
    Group,
    /// User permissions (`_user`).
    User,
    /// A vocabulary namespace (`_vocab`).
    Vocab,
    /// A value of a built-in enumeration, tagged with the enumeration type id.
    Enum(String),
    /// The per-collection container for entities of one type.
    TypeData,
    /// A user data record, tagged with its type id.
    EntityData(String),
}

impl Kind {
    /// Returns the static constants for this kind.
    #[must_use]
    pub fn def(&self) -> &'static KindDef {
        match self {
            Self::Site => &SITE_DEF,
            Self::Collection => &COLLECTION_DEF,
            Self::Type => &TYPE_DEF,
            Self::View => &VIEW_DEF,
            Self::List => &LIST_DEF,
            Self::Field => &FIELD_DEF,
            Self::Group => &GROUP_DEF,
            Self::User => &USER_DEF,
            Self::Vocab => &VOCAB_DEF,
            Self::Enum(_) => &ENUM_DEF,
            Self::TypeData => &TYPEDATA_DEF,
            Self::EntityData(_) => &ENTITY_DATA_DEF,
        }
    }

    /// Returns the kind used to store records of the given type id.
    ///
    /// Reserved ids map to metadata kinds; anything else is user data.
    #[must_use]
    pub fn for_type_id(type_id: &str) -> Self {
        match type_id {
            "_type" => Self::Type,
            "_view" => Self::View,
            "_list" => Self::List,
            "_field" => Self::Field,
            "_group" => Self::Group,
            "_user" => Self::User,
            "_vocab" => Self::Vocab,
            t if layout::is_enum_type_id(t) => Self::Enum(t.to_string()),
            t => Self::EntityData(t.to_string()),
        }
    }

    /// Returns the type id recorded in `annal:type_id` for entities of this kind.
    #[must_use]
    pub fn type_id(&self) -> &str {
        match self {
            Self::Enum(t) | Self::EntityData(t) => t,
            other => other.def().type_id,
        }
    }

    /// Returns the semantic type URI of this kind.
    #[must_use]
    pub fn type_uri(&self) -> &'static str {
        self.def().type_uri
    }

    /// Returns true for the metadata kinds that live under a collection's reserved type ids.
    #[must_use]
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            Self::Type
                | Self::View
                | Self::List
                | Self::Field
                | Self::Group
                | Self::User
                | Self::Vocab
                | Self::Enum(_)
        )
    }

    /// Returns true if an entity of this kind exists when its directory exists,
    /// whether or not a body file has been written.
    #[must_use]
    pub fn exists_by_dir(&self) -> bool {
        matches!(self, Self::TypeData)
    }

    /// Returns the entity directory relative to its parent.
    #[must_use]
    pub fn relpath(&self, id: &str) -> String {
        layout::expand_template(self.def().path, id, self.type_id())
    }

    /// Returns the entity directory relative to its parent's alternate, if the kind has one.
    #[must_use]
    pub fn altpath(&self, id: &str) -> Option<String> {
        self.def()
            .alt_path
            .map(|t| layout::expand_template(t, id, self.type_id()))
    }

    /// Returns the legacy entity directory relative to its parent, if the kind has one.
    #[must_use]
    pub fn legacy_relpath(&self, id: &str) -> Option<String> {
        self.def()
            .legacy_path
            .map(|t| layout::expand_template(t, id, self.type_id()))
    }

    /// Returns the view URL relative to the parent URL.
    #[must_use]
    pub fn view_relpath(&self, id: &str) -> String {
        layout::expand_template(self.def().view_path, id, self.type_id())
    }

    /// Returns the directory, relative to the parent, that holds all children of this kind.
    #[must_use]
    pub fn children_relpath(&self) -> String {
        let expanded = layout::expand_template(self.def().path, "{id}", self.type_id());
        layout::template_parent(&expanded).to_string()
    }

    /// Returns the alternate-parent directory holding children of this kind.
    #[must_use]
    pub fn alt_children_relpath(&self) -> Option<String> {
        self.def().alt_path.map(|t| {
            let expanded = layout::expand_template(t, "{id}", self.type_id());
            layout::template_parent(&expanded).to_string()
        })
    }

    /// Returns the legacy directory, relative to the parent, that holds children of this kind.
    #[must_use]
    pub fn legacy_children_relpath(&self) -> Option<String> {
        self.def().legacy_path.map(|t| {
            let expanded = layout::expand_template(t, "{id}", self.type_id());
            layout::template_parent(&expanded).to_string()
        })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enum(t) | Self::EntityData(t) => write!(f, "{}({t})", self.def().name),
            other => f.write_str(other.def().name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_type_id() {
        assert_eq!(Kind::for_type_id("_type"), Kind::Type);
        assert_eq!(Kind::for_type_id("_user"), Kind::User);
        assert_eq!(
            Kind::for_type_id("_enum_render_type"),
            Kind::Enum("_enum_render_type".to_string())
        );
        assert_eq!(Kind::for_type_id("t1"), Kind::EntityData("t1".to_string()));
    }

    #[test]
    fn test_type_ids() {
        assert_eq!(Kind::Type.type_id(), "_type");
        assert_eq!(Kind::EntityData("t1".to_string()).type_id(), "t1");
        assert_eq!(Kind::Enum("_enum_list_type".to_string()).type_id(), "_enum_list_type");
        assert_eq!(Kind::Field.type_uri(), "annal:Field");
    }

    #[test]
    fn test_relpaths() {
        assert_eq!(Kind::Collection.relpath("testcoll"), "c/testcoll");
        assert_eq!(Kind::Type.relpath("t1"), "d/_type/t1");
        assert_eq!(Kind::TypeData.relpath("t1"), "d/t1");
        assert_eq!(Kind::EntityData("t1".to_string()).relpath("e1"), "e1");
        let e = Kind::Enum("_enum_value_mode".to_string());
        assert_eq!(e.relpath("Value_direct"), "d/_enum_value_mode/Value_direct");
        assert_eq!(e.altpath("Value_direct").unwrap(), "d/_enum_value_mode/Value_direct");
        assert!(Kind::Collection.altpath("x").is_none());
        assert_eq!(Kind::View.legacy_relpath("v1").unwrap(), "_annalist_collection/views/v1");
        assert_eq!(Kind::View.legacy_children_relpath().unwrap(), "_annalist_collection/views");
        assert!(Kind::TypeData.legacy_children_relpath().is_none());
    }

    #[test]
    fn test_children_relpaths() {
        assert_eq!(Kind::Collection.children_relpath(), "c");
        assert_eq!(Kind::Type.children_relpath(), "d/_type");
        assert_eq!(Kind::TypeData.children_relpath(), "d");
        assert_eq!(Kind::EntityData("t1".to_string()).children_relpath(), "");
        assert_eq!(
            Kind::Enum("_enum_list_type".to_string()).alt_children_relpath().unwrap(),
            "d/_enum_list_type"
        );
    }

    #[test]
    fn test_view_relpath_and_display() {
        assert_eq!(Kind::Type.view_relpath("t1"), "d/_type/t1/");
        assert_eq!(Kind::EntityData("t1".to_string()).view_relpath("e1"), "e1/");
        assert_eq!(Kind::EntityData("t1".to_string()).to_string(), "EntityData(t1)");
        assert_eq!(Kind::Type.to_string(), "RecordType");
    }
}
