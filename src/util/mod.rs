//! Path, identifier and URL helpers shared by every layer of the store.

pub mod ident;
pub mod paths;
pub mod urls;

pub use ident::{
    extract_entity_id, make_type_entity_id, slug_from_name, slug_from_path, slug_from_uri,
    split_type_entity_id, valid_id,
};
pub use paths::{entity_dir_path, entity_path, strip_comments};
pub use urls::{
    continuation_chain_url, continuation_params, continuation_url_chain, entity_url_host,
    entity_url_path, make_resource_url, uri_base, uri_param_dict, uri_params, uri_with_params,
    url_update_type_entity_id, UriParams,
};
