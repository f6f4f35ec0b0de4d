//! Slug validation and type/entity identifier helpers.

use std::sync::OnceLock;

use regex::Regex;

use crate::layout::{MAX_ID_LEN, RESERVED_IDS};

static SLUG_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn slug_regex() -> Option<&'static Regex> {
    SLUG_RE
        .get_or_init(|| Regex::new(r"^\w+$").ok())
        .as_ref()
}

/// Checks that `id` can be used as an entity slug.
///
/// A slug is one or more word characters, at most [`MAX_ID_LEN`] of them,
/// so it can appear as a single URI path segment. The reserved site and
/// collection names are rejected unless `allow_reserved` is set.
#[must_use]
pub fn valid_id(id: &str, allow_reserved: bool) -> bool {
    if id.is_empty() || id.chars().count() > MAX_ID_LEN {
        return false;
    }
    let Some(re) = slug_regex() else {
        return false;
    };
    if !re.is_match(id) {
        return false;
    }
    allow_reserved || !RESERVED_IDS.contains(&id)
}

/// Splits a `type_id/entity_id` reference.
///
/// A reference with exactly one `/` is split in two. Anything else is taken
/// as a bare entity id and `default_type` fills the type slot.
#[must_use]
pub fn split_type_entity_id(
    reference: Option<&str>,
    default_type: Option<&str>,
) -> (Option<String>, Option<String>) {
    let default_type = default_type.map(str::to_string);
    let Some(reference) = reference else {
        return (default_type, None);
    };
    let mut parts = reference.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(type_id), Some(entity_id), None) => {
            (Some(type_id.to_string()), Some(entity_id.to_string()))
        }
        _ => (default_type, Some(reference.to_string())),
    }
}

/// Joins a type id and entity id into a `type_id/entity_id` reference.
///
/// An empty entity id gives an empty reference.
#[must_use]
pub fn make_type_entity_id(type_id: &str, entity_id: &str) -> String {
    if entity_id.is_empty() {
        return String::new();
    }
    format!("{type_id}/{entity_id}")
}

/// Returns the entity id part of a possibly type-qualified reference.
#[must_use]
pub fn extract_entity_id(reference: &str) -> &str {
    match reference.split_once('/') {
        Some((_, entity_id)) => entity_id,
        None => reference,
    }
}

/// Returns a file name without its extension.
///
/// A leading dot does not start an extension, so `.baz` stays `.baz`.
#[must_use]
pub fn slug_from_name(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if filename[..pos].trim_start_matches('.').is_empty() => filename,
        Some(pos) => &filename[..pos],
        None => filename,
    }
}

/// Returns the final segment of a path without its extension.
#[must_use]
pub fn slug_from_path(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    slug_from_name(base)
}

/// Returns the final path segment of a URI without extension, query or fragment.
#[must_use]
pub fn slug_from_uri(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    slug_from_path(&uri[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_id() {
        assert!(valid_id("abcdef_1234", false));
        assert!(valid_id("_type", false));
        assert!(!valid_id("abcdef/1234", false));
        assert!(!valid_id("", false));
        assert!(!valid_id("a b", false));
        assert!(!valid_id("a-b", false));
    }

    #[test]
    fn test_valid_id_length_limit() {
        let ok = "a".repeat(MAX_ID_LEN);
        let long = "a".repeat(MAX_ID_LEN + 1);
        assert!(valid_id(&ok, false));
        assert!(!valid_id(&long, false));
    }

    #[test]
    fn test_valid_id_reserved() {
        assert!(!valid_id("_annalist_collection", false));
        assert!(!valid_id("_annalist_site", false));
        assert!(valid_id("_annalist_site", true));
        assert!(valid_id("_annalist_collection", true));
    }

    #[test]
    fn test_split_type_entity_id() {
        assert_eq!(
            split_type_entity_id(Some("t1/e1"), Some("def")),
            (Some("t1".to_string()), Some("e1".to_string()))
        );
        assert_eq!(
            split_type_entity_id(Some("e1"), Some("def")),
            (Some("def".to_string()), Some("e1".to_string()))
        );
        assert_eq!(split_type_entity_id(None, Some("def")), (Some("def".to_string()), None));
        assert_eq!(split_type_entity_id(Some("e1"), None), (None, Some("e1".to_string())));
        assert_eq!(
            split_type_entity_id(Some("a/b/c"), Some("def")),
            (Some("def".to_string()), Some("a/b/c".to_string()))
        );
    }

    #[test]
    fn test_make_and_extract() {
        assert_eq!(make_type_entity_id("t1", "e1"), "t1/e1");
        assert_eq!(make_type_entity_id("t1", ""), "");
        assert_eq!(extract_entity_id("t1/e1"), "e1");
        assert_eq!(extract_entity_id("e1"), "e1");
    }

    #[test]
    fn test_slug_from_name_and_path() {
        assert_eq!(slug_from_name("bar.baz"), "bar");
        assert_eq!(slug_from_name("bar"), "bar");
        assert_eq!(slug_from_name(".baz"), ".baz");
        assert_eq!(slug_from_path("/foo/bar.baz"), "bar");
        assert_eq!(slug_from_path("/bar"), "bar");
        assert_eq!(slug_from_path("/example.org/foo/bar/.baz"), ".baz");
        assert_eq!(slug_from_path("/example.org/foo/bar/"), "");
    }

    #[test]
    fn test_slug_from_uri() {
        assert_eq!(slug_from_uri("http:/example.org/foo/bar"), "bar");
        assert_eq!(slug_from_uri("/foo/bar"), "bar");
        assert_eq!(slug_from_uri("bar"), "bar");
        assert_eq!(slug_from_uri("/example.org/foo/bar/"), "");
        assert_eq!(slug_from_uri("http:/example.org/foo/bar.baz"), "bar");
        assert_eq!(slug_from_uri("http:/example.org/foo/bar;baz"), "bar;baz");
        assert_eq!(slug_from_uri("http:/example.org/foo/bar?baz"), "bar");
        assert_eq!(slug_from_uri("http:/example.org/foo/bar#baz"), "bar");
    }
}
