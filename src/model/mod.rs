//! Typed views over the entity tree: site, collections, types.

pub mod collection;
pub mod migrate;
pub mod record_type;
pub mod site;
pub mod type_info;

pub use collection::{Collection, DEFAULT_USER_PERMISSIONS};
pub use migrate::migrate_values;
pub use record_type::{FieldAlias, RecordType, DEFAULT_LIST_ID, DEFAULT_VIEW_ID};
pub use site::Site;
pub use type_info::TypeInfo;

use crate::config::StoreConfig;
use crate::error::StoreResult;

/// Opens the site described by `config` (defaults when `None`).
///
/// # Errors
/// Configuration validation errors, I/O errors creating the site directory,
/// or (with `lock_site`) a lock held by another process.
pub fn open_site(config: Option<StoreConfig>) -> StoreResult<Site> {
    let cfg = config.unwrap_or_default().validate()?;
    Site::open(cfg)
}
