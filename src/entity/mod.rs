//! On-disk entities.
//!
//! This module groups the kind table, enumeration scopes, the [`Entity`]
//! handle with its alternate-parent lookup, and the advisory site lock.

#[allow(clippy::module_inception)]
pub mod entity;
pub mod kind;
#[cfg(feature = "site-lock")]
pub mod lock;
pub mod scope;

pub use entity::{Entity, EntityValues, Location, Origin, PathSegment};
pub use kind::{Kind, KindDef};
#[cfg(feature = "site-lock")]
pub use lock::SiteLock;
pub use scope::Scope;
