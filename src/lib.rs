//! # annalist-store
//!
//! A typed, hierarchical, file-backed JSON-LD entity store.
//!
//! A site holds collections; each collection holds type, view, list, field,
//! group, user and vocabulary definitions plus user data records. Every
//! entity is a directory with a JSON-LD body file. Collections inherit
//! definitions from the site data collection (`_annalist_site`), so a
//! lookup that misses locally falls through to the site overlay.
//!
//! ## Layers
//!
//! - **entity**: on-disk entities, their kinds and enumeration scopes
//! - **model**: site, collection, record type and type-info views
//! - **cache**: per-collection entity caches owned by the site handle
//! - **finder**: the selector language and collection-wide entity search
//! - **field** / **value_map**: field descriptions and the bidirectional
//!   mapping between entity values, display contexts and form data
//! - **resource**: attached files and JSON-LD/Turtle renderings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use annalist_store::{open_site, Scope, StoreConfig};
//! use serde_json::{json, Map};
//!
//! let site = open_site(Some(StoreConfig::new("/var/annalist")))?;
//! site.initialize("My site")?;
//! let coll = site.create_collection("notes", Map::new())?;
//!
//! let mut values = Map::new();
//! values.insert("rdfs:label".into(), json!("First note"));
//! coll.add_entity("note", "n1", values)?;
//!
//! let found = coll.get_entity("note", "n1", Scope::All)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Foundations
pub mod config;
pub mod error;
pub mod layout;
pub mod util;
pub mod vocab;

// Storage and model
pub mod cache;
pub mod entity;
pub mod model;

// Search and presentation
pub mod field;
pub mod finder;
pub mod resource;
pub mod value_map;

pub use config::StoreConfig;
pub use entity::{Entity, EntityValues, Kind, Origin, Scope};
pub use error::{ExecutionError, StoreError, StoreResult, ValidationError};
pub use field::{BoundField, FieldDescriber, FieldDescription, Placement};
pub use finder::{EntityFinder, FinderQuery, Selector};
pub use model::{open_site, Collection, RecordType, Site, TypeInfo};
pub use resource::open_entity_resource;
pub use value_map::EntityValueMap;
