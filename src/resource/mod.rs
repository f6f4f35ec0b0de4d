//! Resource access: fixed JSON-LD bodies, their Turtle renderings, and
//! field-declared attachments.
//!
//! A resource reference is resolved against, in order, the fixed JSON-LD
//! resources of the entity's kind, a `.ttl` sibling of each of those, and
//! any entity field value naming an attached file through `resource_name`.

pub mod turtle;

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::entity::{Entity, Kind};
use crate::error::StoreResult;
use crate::layout;
use crate::util::paths::{is_within, normalize, read_json};
use crate::vocab::{annal, jsonld};

pub use turtle::{jsonld_to_turtle, JsonLdContext, TurtleError};

/// Content type of stored JSON-LD bodies.
pub const JSONLD_CONTENT_TYPE: &str = "application/ld+json";
/// Content type of generated Turtle.
pub const TURTLE_CONTENT_TYPE: &str = "text/turtle";
/// Content type of attachments that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const JSONLD_SUFFIX: &str = ".jsonld";
const TURTLE_SUFFIX: &str = ".ttl";

/// How the bytes of a resource are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAccess {
    /// Streamed from the stored file.
    File,
    /// Generated as Turtle from the stored JSON-LD file.
    Turtle,
}

/// A resource located for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Reference under which the resource is requested.
    pub resource_ref: String,
    /// Stored file, relative to the entity directory.
    pub path: String,
    /// Content type of the produced bytes.
    pub content_type: String,
    /// How the bytes are produced.
    pub access: ResourceAccess,
}

impl ResourceInfo {
    fn json(path: &str) -> Self {
        Self {
            resource_ref: file_name(path).to_string(),
            path: path.to_string(),
            content_type: JSONLD_CONTENT_TYPE.to_string(),
            access: ResourceAccess::File,
        }
    }

    /// Returns the Turtle sibling of a JSON-LD resource.
    #[must_use]
    pub fn turtle(&self) -> Option<Self> {
        let stem = self.resource_ref.strip_suffix(JSONLD_SUFFIX)?;
        Some(Self {
            resource_ref: format!("{stem}{TURTLE_SUFFIX}"),
            path: self.path.clone(),
            content_type: TURTLE_CONTENT_TYPE.to_string(),
            access: ResourceAccess::Turtle,
        })
    }

    fn matches(&self, resource_ref: &str) -> bool {
        if self.resource_ref == resource_ref {
            return true;
        }
        // Collections also answer to the data-directory path of their files.
        (self.access == ResourceAccess::File && self.path == resource_ref)
            || self.turtle_path().as_deref() == Some(resource_ref)
    }

    fn turtle_path(&self) -> Option<String> {
        if self.access != ResourceAccess::Turtle {
            return None;
        }
        let stem = self.path.strip_suffix(JSONLD_SUFFIX)?;
        Some(format!("{stem}{TURTLE_SUFFIX}"))
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns the fixed JSON-LD resources of a kind.
#[must_use]
pub fn fixed_json_resources(kind: &Kind) -> Vec<ResourceInfo> {
    let def = kind.def();
    let mut out = vec![ResourceInfo::json(def.body_file)];
    if let Some(prov) = def.prov_file {
        out.push(ResourceInfo::json(prov));
    }
    if *kind == Kind::Collection {
        out.push(ResourceInfo::json(layout::COLL_CONTEXT_FILE));
    }
    out
}

/// Returns every fixed resource of a kind, JSON-LD files followed by their Turtle siblings.
#[must_use]
pub fn fixed_resources(kind: &Kind) -> Vec<ResourceInfo> {
    let json = fixed_json_resources(kind);
    let turtle: Vec<ResourceInfo> = json.iter().filter_map(ResourceInfo::turtle).collect();
    json.into_iter().chain(turtle).collect()
}

/// Finds a resource for an entity without opening it.
#[must_use]
pub fn find_entity_resource(entity: &Entity, resource_ref: &str) -> Option<ResourceInfo> {
    if let Some(info) = fixed_resources(entity.kind())
        .into_iter()
        .find(|r| r.matches(resource_ref))
    {
        return Some(info);
    }
    entity.enum_fields().into_iter().find_map(|(_, value)| {
        let Value::Object(obj) = value else {
            return None;
        };
        if obj.get(annal::RESOURCE_NAME).and_then(Value::as_str) != Some(resource_ref) {
            return None;
        }
        let content_type = obj
            .get(annal::RESOURCE_TYPE)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        Some(ResourceInfo {
            resource_ref: resource_ref.to_string(),
            path: resource_ref.to_string(),
            content_type: content_type.to_string(),
            access: ResourceAccess::File,
        })
    })
}

/// A readable resource stream.
pub type ResourceStream = Box<dyn Read + Send>;

/// Opens a resource of an entity.
///
/// `base_url` is the absolute URL of the entity, used as the subject and
/// document base when generating Turtle. Returns `None` when no resource matches or its
/// file is absent. Turtle generation failures yield an error record rather
/// than an error.
///
/// # Errors
/// I/O errors opening a stored file.
pub fn open_entity_resource(
    entity: &Entity,
    resource_ref: &str,
    base_url: &str,
) -> StoreResult<Option<(ResourceStream, String)>> {
    let Some(info) = find_entity_resource(entity, resource_ref) else {
        debug!(entity_id = %entity.id(), resource_ref, "resource not found");
        return Ok(None);
    };
    match info.access {
        ResourceAccess::File => {
            let file: Option<File> = entity.resource_file(&info.path)?;
            Ok(file.map(|f| (Box::new(f) as ResourceStream, info.content_type)))
        }
        ResourceAccess::Turtle => {
            let Some(path) = entity.resource_path(&info.path) else {
                return Ok(None);
            };
            let text = match turtle_for_file(entity, &path, &info.path, base_url) {
                Ok(text) => text,
                Err(reason) => {
                    warn!(entity_id = %entity.id(), resource_ref, %reason, "Turtle generation failed");
                    error_record("Error generating Turtle output", &reason)
                }
            };
            let stream: ResourceStream = Box::new(Cursor::new(text.into_bytes()));
            Ok(Some((stream, info.content_type)))
        }
    }
}

fn turtle_for_file(entity: &Entity, path: &Path, rel_path: &str, base_url: &str) -> Result<String, String> {
    let mut document = read_json(path).map_err(|e| e.to_string())?;
    // The stored `@id` is relative to the body file; the subject is the entity itself.
    if let Value::Object(node) = &mut document {
        node.insert(jsonld::ID.to_string(), Value::String(base_url.to_string()));
    }
    let body_dir = path.parent().map(PathBuf::from).unwrap_or_default();
    let mut contexts = Vec::new();
    let declared = match document.get(jsonld::CONTEXT) {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    for context in declared {
        match context {
            Value::String(reference) => {
                let context_path = normalize(&body_dir.join(&reference));
                if !is_within(&context_path, entity.site_root()) {
                    return Err(format!("context '{reference}' is outside the site"));
                }
                let loaded = read_json(&context_path).map_err(|e| format!("context '{reference}': {e}"))?;
                match loaded.get(jsonld::CONTEXT) {
                    Some(Value::Array(items)) => contexts.extend(items.iter().cloned()),
                    Some(inner) => contexts.push(inner.clone()),
                    None => return Err(format!("context '{reference}' has no @context")),
                }
            }
            other => contexts.push(other),
        }
    }
    let base = Url::parse(base_url)
        .and_then(|u| u.join(rel_path))
        .map_err(|e| format!("base URL '{base_url}': {e}"))?;
    jsonld_to_turtle(&document, &contexts, Some(base)).map_err(|e| e.to_string())
}

/// Formats a readable error record returned in place of generated content.
#[must_use]
pub fn error_record(message: &str, reason: &str) -> String {
    format!("\n\n***** ERROR ****\n\n{message}\n\nReason:\n\n{reason}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Scope;
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;

    fn setup(root: &Path) -> Entity {
        let dir = root.join("annalist_site");
        let site = Entity::root(Kind::Site, "site", dir.clone(), "/annalist/", dir);
        let coll = site.child(Kind::Collection, "coll").unwrap();
        let td = coll.child(Kind::TypeData, "t1").unwrap();
        let mut values = serde_json::Map::new();
        values.insert("rdfs:label".to_string(), json!("Entity one"));
        values.insert(
            "ex:image".to_string(),
            json!({"resource_name": "image.png", "resource_type": "image/png"}),
        );
        td.create_child(Kind::EntityData("t1".to_string()), "e1", values).unwrap();
        let context = json!({"@context": [{"rdfs": "http://www.w3.org/2000/01/rdf-schema#",
            "annal": "http://purl.org/annalist/2014/#", "ex": "http://example.org/ns/"}]});
        std::fs::write(
            coll.dir().join(layout::COLL_CONTEXT_FILE),
            serde_json::to_vec(&context).unwrap(),
        )
        .unwrap();
        td.load_child(Kind::EntityData("t1".to_string()), "e1", Scope::All)
            .unwrap()
            .unwrap()
    }

    fn read_all(mut stream: ResourceStream) -> String {
        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_fixed_resource_table() {
        let names: Vec<String> = fixed_resources(&Kind::Collection)
            .into_iter()
            .map(|r| r.resource_ref)
            .collect();
        assert_eq!(
            names,
            vec![
                "coll_meta.jsonld",
                "coll_prov.jsonld",
                "coll_context.jsonld",
                "coll_meta.ttl",
                "coll_prov.ttl",
                "coll_context.ttl"
            ]
        );
        assert_eq!(fixed_resources(&Kind::TypeData).len(), 2);
    }

    #[test]
    fn test_open_json_body() {
        let dir = tempdir().unwrap();
        let e1 = setup(dir.path());
        let (stream, content_type) = open_entity_resource(&e1, "entity_data.jsonld", "http://example.org/annalist/c/coll/d/t1/e1/")
            .unwrap()
            .unwrap();
        assert_eq!(content_type, JSONLD_CONTENT_TYPE);
        let body: Value = serde_json::from_str(&read_all(stream)).unwrap();
        assert_eq!(body["rdfs:label"], "Entity one");
    }

    #[test]
    fn test_open_turtle_sibling() {
        let dir = tempdir().unwrap();
        let e1 = setup(dir.path());
        let (stream, content_type) = open_entity_resource(&e1, "entity_data.ttl", "http://example.org/annalist/c/coll/d/t1/e1/")
            .unwrap()
            .unwrap();
        assert_eq!(content_type, TURTLE_CONTENT_TYPE);
        let text = read_all(stream);
        assert!(text.contains("<http://example.org/annalist/c/coll/d/t1/e1/>"), "{text}");
        assert!(text.contains("rdfs:label \"Entity one\""));
        assert!(text.contains("a annal:EntityData"));
    }

    #[test]
    fn test_turtle_error_is_streamed() {
        let dir = tempdir().unwrap();
        let e1 = setup(dir.path());
        let (stream, _) = open_entity_resource(&e1, "entity_data.ttl", "not a url").unwrap().unwrap();
        let text = read_all(stream);
        assert!(text.contains("***** ERROR ****"));
        assert!(text.contains("Reason:"));
    }

    #[test]
    fn test_attachment_lookup() {
        let dir = tempdir().unwrap();
        let e1 = setup(dir.path());
        assert!(open_entity_resource(&e1, "image.png", "http://h/").unwrap().is_none());
        e1.create_resource("image.png").unwrap().write_all(b"PNG").unwrap();
        let (stream, content_type) = open_entity_resource(&e1, "image.png", "http://h/").unwrap().unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(read_all(stream), "PNG");
        assert!(open_entity_resource(&e1, "other.txt", "http://h/").unwrap().is_none());
    }
}
