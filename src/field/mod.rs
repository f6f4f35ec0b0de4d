//! Field layer: placements, renderers, field descriptions and bound fields.
//!
//! A view record lists field references. [`FieldDescriber`] compiles each
//! reference into a [`FieldDescription`], and a [`BoundField`] pairs a
//! description with the entity values being rendered.

pub mod bound;
pub mod description;
pub mod placement;
pub mod renderer;

pub use bound::{bound_entity_values, BoundField};
pub use description::{
    FieldChoice, FieldDescriber, FieldDescription, FieldGroup, PropertyHierarchy, SeenProperties,
};
pub use placement::{LayoutOptions, Placement, GRID_COLUMNS};
pub use renderer::{field_jsonld_context, value_mode, FieldRenderer, RenderMode, ValueMapper};
