//! Render types: renderer selection, value mappers and JSON-LD term definitions.
//!
//! Render types are open-ended names (records of `_enum_render_type`); this
//! module knows the built-in ones and how each stores its value.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::vocab::jsonld;

/// Render types whose value is a repeated group of sub-field values.
pub const REPEAT_RENDER_TYPES: &[&str] = &[
    "RepeatGroup",
    "RepeatGroupRow",
    "Group_Seq",
    "Group_Seq_Row",
    "Group_Set",
    "Group_Set_Row",
];

/// Render types presented as a choice among entities of a referenced type.
pub const ENUM_RENDER_TYPES: &[&str] = &[
    "EntityTypeId",
    "Type",
    "View",
    "List",
    "Field",
    "Enum",
    "Enum_optional",
    "Enum_choice",
];

/// Render types whose choice list starts with an empty option.
pub const OPTIONAL_ENUM_RENDER_TYPES: &[&str] = &["Enum_optional", "Enum_choice_opt"];

const SELECT_RENDER_TYPES: &[&str] = &[
    "Enum",
    "Enum_optional",
    "Enum_choice",
    "Enum_choice_opt",
    "View_choice",
    "List_sel",
];

const KNOWN_RENDER_TYPES: &[&str] = &[
    "Text",
    "Showtext",
    "Textarea",
    "Codearea",
    "EntityRef",
    "EntityId",
    "Identifier",
    "Padding",
    "Placement",
    "TokenSet",
    "CheckBox",
    "Markdown",
    "ShowMarkdown",
    "RefAudio",
    "RefImage",
    "URILink",
    "URIImport",
    "FileUpload",
    "EntityTypeId",
    "Enum",
    "Enum_optional",
    "Enum_choice",
    "Enum_choice_opt",
    "View_choice",
    "RefMultifield",
    "RepeatGroup",
    "Group_Seq",
    "Group_Set",
    "RepeatGroupRow",
    "Group_Seq_Row",
    "Group_Set_Row",
    "RepeatListRow",
    "FieldRow",
    "URIImage",
    "Type",
    "View",
    "List",
    "Field",
    "List_sel",
];

/// Value modes (records of `_enum_value_mode`).
pub mod value_mode {
    /// Value stored directly in the entity.
    pub const DIRECT: &str = "Value_direct";
    /// Value is a reference to another entity.
    pub const ENTITY: &str = "Value_entity";
    /// Value is taken from a field of a referenced entity.
    pub const FIELD: &str = "Value_field";
    /// Value is imported from a URI.
    pub const IMPORT: &str = "Value_import";
    /// Value is an uploaded file.
    pub const UPLOAD: &str = "Value_upload";
}

/// Returns true if `render_type` displays a repeated group of fields.
#[must_use]
pub fn is_repeat_render_type(render_type: &str) -> bool {
    REPEAT_RENDER_TYPES.contains(&render_type)
}

/// Returns true if `render_type` selects among enumerated entities.
#[must_use]
pub fn is_enum_render_type(render_type: &str) -> bool {
    ENUM_RENDER_TYPES.contains(&render_type)
}

/// Returns true if `render_type` is one this crate knows how to render.
#[must_use]
pub fn is_known_render_type(render_type: &str) -> bool {
    KNOWN_RENDER_TYPES.contains(&render_type)
}

/// Rendering contexts for which a field supplies a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Value display in a view.
    View,
    /// Value input in a form.
    Edit,
    /// Heading for a repeated group.
    Head,
    /// One item of a repeated group.
    Item,
    /// Field label.
    Label,
    /// Column heading in a list.
    ColHead,
    /// Column cell in a list view.
    ColView,
    /// Column cell in a list edit form.
    ColEdit,
}

impl RenderMode {
    /// Every mode, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::View,
        Self::Edit,
        Self::Head,
        Self::Item,
        Self::Label,
        Self::ColHead,
        Self::ColView,
        Self::ColEdit,
    ];

    /// Returns the mode name used in renderer names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Head => "head",
            Self::Item => "item",
            Self::Label => "label",
            Self::ColHead => "col-head",
            Self::ColView => "col-view",
            Self::ColEdit => "col-edit",
        }
    }

    const fn is_edit(self) -> bool {
        matches!(self, Self::Edit | Self::ColEdit)
    }
}

/// Renderer selection for one field.
///
/// The web layer resolves renderer names (`"<render type>:<mode>"`) to
/// templates; this type only decides which render type applies per mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRenderer {
    render_type: String,
    value_mode: String,
}

impl FieldRenderer {
    /// Creates the renderer selection for a render type and value mode.
    #[must_use]
    pub fn new(render_type: &str, value_mode: &str) -> Self {
        let render_type = if is_known_render_type(render_type) {
            render_type
        } else {
            warn!(render_type, "unknown render type, using Text");
            "Text"
        };
        Self {
            render_type: render_type.to_string(),
            value_mode: value_mode.to_string(),
        }
    }

    /// Returns the base render type.
    #[must_use]
    pub fn render_type(&self) -> &str {
        &self.render_type
    }

    /// Returns the render type used when editing, which depends on the value mode.
    #[must_use]
    pub fn edit_render_type(&self) -> &str {
        match self.value_mode.as_str() {
            value_mode::ENTITY | value_mode::FIELD
                if !SELECT_RENDER_TYPES.contains(&self.render_type.as_str()) =>
            {
                "Enum"
            }
            value_mode::IMPORT => "URIImport",
            value_mode::UPLOAD => "FileUpload",
            _ => &self.render_type,
        }
    }

    /// Returns the renderer name for `mode`.
    #[must_use]
    pub fn renderer(&self, mode: RenderMode) -> String {
        let render_type = if mode.is_edit() {
            self.edit_render_type()
        } else {
            &self.render_type
        };
        format!("{render_type}:{}", mode.as_str())
    }

    /// Returns the value mapper for this field's render type.
    #[must_use]
    pub fn value_mapper(&self) -> ValueMapper {
        ValueMapper::for_render_type(&self.render_type)
    }
}

/// Conversion between stored values and form values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueMapper {
    /// Values pass through unchanged.
    #[default]
    Identity,
    /// A list of tokens shown as a space-separated string.
    TokenSet,
    /// A boolean shown as a checkbox (`Yes`/`No`).
    CheckBox,
}

impl ValueMapper {
    /// Selects the mapper for a render type.
    #[must_use]
    pub fn for_render_type(render_type: &str) -> Self {
        match render_type {
            "TokenSet" => Self::TokenSet,
            "CheckBox" => Self::CheckBox,
            _ => Self::Identity,
        }
    }

    /// Converts a stored value to its form representation.
    #[must_use]
    pub fn encode(self, value: &Value) -> Value {
        match self {
            Self::Identity => value.clone(),
            Self::TokenSet => match value {
                Value::Array(items) => {
                    let tokens: Vec<String> = items
                        .iter()
                        .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                        .collect();
                    Value::String(tokens.join(" "))
                }
                Value::String(_) => {
                    debug!("token set value is already a string");
                    value.clone()
                }
                other => {
                    warn!(value = %other, "token set value is not a list");
                    Value::String(other.to_string())
                }
            },
            Self::CheckBox => Value::String(match value {
                Value::Null => "No".to_string(),
                Value::String(s) => s.clone(),
                Value::Bool(true) => "Yes".to_string(),
                Value::Bool(false) => "No".to_string(),
                other => format!("Unknown Boolean {other}"),
            }),
        }
    }

    /// Converts a form value back to its stored representation.
    #[must_use]
    pub fn decode(self, value: &Value) -> Value {
        match self {
            Self::Identity => value.clone(),
            Self::TokenSet => match value {
                Value::String(s) => Value::Array(s.split_whitespace().map(|t| json!(t)).collect()),
                Value::Array(_) => value.clone(),
                other => {
                    warn!(value = %other, "token set form value is not a string");
                    Value::Array(vec![other.clone()])
                }
            },
            Self::CheckBox => Value::Bool(match value {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                Value::Bool(b) => *b,
                _ => true,
            }),
        }
    }
}

const LITERAL_RENDER_TYPES: &[&str] = &[
    "Text",
    "Textarea",
    "Codearea",
    "Showtext",
    "Placement",
    "CheckBox",
    "Markdown",
    "ShowMarkdown",
    "EntityId",
    "EntityTypeId",
    "TokenSet",
];

const ID_RENDER_TYPES: &[&str] = &[
    "Identifier",
    "EntityRef",
    "RefAudio",
    "RefImage",
    "URILink",
    "URIImage",
    "RefMultifield",
    "Group_Set",
    "Group_Set_Row",
    "Enum",
    "Enum_optional",
    "Enum_choice",
    "Enum_choice_opt",
    "View_choice",
    "Type",
    "View",
    "List",
    "Field",
];

const SET_RENDER_TYPES: &[&str] = &["TokenSet", "Group_Set", "Group_Set_Row"];

const LIST_RENDER_TYPES: &[&str] = &["RepeatGroup", "RepeatGroupRow", "Group_Seq", "Group_Seq_Row"];

const OBJECT_RENDER_TYPES: &[&str] = &[
    "URIImport",
    "FileUpload",
    "RepeatGroup",
    "RepeatGroupRow",
    "Group_Seq",
    "Group_Seq_Row",
];

/// Returns the JSON-LD term definition for a field's property, if it needs one.
///
/// The value mode can override the render type: entity references become
/// `Enum`, imports `URIImport`, uploads `FileUpload`.
#[must_use]
pub fn field_jsonld_context(render_type: &str, value_mode: &str) -> Option<Value> {
    let rtype = match value_mode {
        value_mode::ENTITY | value_mode::FIELD => "Enum",
        value_mode::IMPORT => "URIImport",
        value_mode::UPLOAD => "FileUpload",
        _ => render_type,
    };
    if LITERAL_RENDER_TYPES.contains(&rtype) {
        return None;
    }
    if ID_RENDER_TYPES.contains(&rtype) {
        return Some(json!({ jsonld::TYPE: jsonld::ID }));
    }
    if SET_RENDER_TYPES.contains(&rtype) {
        return Some(json!({ jsonld::CONTAINER: jsonld::SET }));
    }
    if LIST_RENDER_TYPES.contains(&rtype) {
        return Some(json!({ jsonld::CONTAINER: jsonld::LIST }));
    }
    if !OBJECT_RENDER_TYPES.contains(&rtype) {
        warn!(render_type = rtype, "no JSON-LD context rule for render type");
    }
    None
}
