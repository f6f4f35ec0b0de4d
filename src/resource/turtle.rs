//! A small JSON-LD to Turtle converter for stored entity bodies.
//!
//! Covers the JSON-LD subset the store writes: an `@context` array of
//! objects (`@base`, `@vocab`, prefix and term definitions with `@id`,
//! `@type: @id` and `@container: @list`), node objects with `@id`/`@type`,
//! value objects, and nested nodes, which become blank nodes. A top-level
//! `@graph` array is flattened into one default graph.
//!
//! This is not a general JSON-LD processor. Not handled: remote contexts
//! (string contexts must be loaded by the caller), scoped and protected
//! contexts, keyword aliases, `@reverse`, `@nest`, `@included`, `@json`,
//! containers other than `@list` (`@set` is treated as a plain array;
//! `@index`, `@language`, `@id` and `@type` maps are not expanded), and
//! term-level `@language` defaults. Terms that do not expand to an absolute
//! IRI are dropped, as JSON-LD expansion would drop them.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::vocab::jsonld;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Errors converting JSON-LD to Turtle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurtleError {
    #[error("Invalid JSON-LD context: {0}")]
    InvalidContext(String),

    #[error("Cannot resolve IRI '{0}'")]
    UnresolvedIri(String),

    #[error("IRI '{0}' contains characters not allowed in Turtle")]
    InvalidIri(String),

    #[error("Expected a JSON-LD node object, found {0}")]
    NotANode(String),
}

#[derive(Debug, Clone, Default)]
struct TermDef {
    id: Option<String>,
    id_valued: bool,
    list: bool,
    datatype: Option<String>,
}

/// An active JSON-LD context.
#[derive(Debug, Clone, Default)]
pub struct JsonLdContext {
    terms: HashMap<String, TermDef>,
    vocab: Option<String>,
    base: Option<Url>,
}

impl JsonLdContext {
    /// Creates an empty context with a document base IRI.
    #[must_use]
    pub fn new(base: Option<Url>) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// Applies a local context object.
    ///
    /// # Errors
    /// `InvalidContext` for anything but an object, or an unresolvable `@base`.
    pub fn merge(&mut self, context: &Value) -> Result<(), TurtleError> {
        let Value::Object(map) = context else {
            return Err(TurtleError::InvalidContext(context.to_string()));
        };
        if let Some(base) = map.get(jsonld::BASE) {
            self.base = match base {
                Value::Null => None,
                Value::String(b) => Some(self.resolve(b)?),
                other => return Err(TurtleError::InvalidContext(format!("@base {other}"))),
            };
        }
        if let Some(vocab) = map.get(jsonld::VOCAB).and_then(Value::as_str) {
            self.vocab = Some(vocab.to_string());
        }
        for (term, def) in map {
            if term.starts_with('@') {
                continue;
            }
            let def = match def {
                Value::String(id) => TermDef {
                    id: Some(id.clone()),
                    ..TermDef::default()
                },
                Value::Object(d) => {
                    let type_ = d.get(jsonld::TYPE).and_then(Value::as_str);
                    TermDef {
                        id: d.get(jsonld::ID).and_then(Value::as_str).map(str::to_string),
                        id_valued: type_ == Some(jsonld::ID),
                        list: d.get(jsonld::CONTAINER).and_then(Value::as_str) == Some(jsonld::LIST),
                        datatype: type_.filter(|t| !t.starts_with('@')).map(str::to_string),
                    }
                }
                Value::Null => {
                    self.terms.remove(term);
                    continue;
                }
                other => return Err(TurtleError::InvalidContext(format!("{term}: {other}"))),
            };
            self.terms.insert(term.clone(), def);
        }
        Ok(())
    }

    fn resolve(&self, reference: &str) -> Result<Url, TurtleError> {
        match &self.base {
            Some(base) => base.join(reference),
            None => Url::parse(reference),
        }
        .map_err(|_| TurtleError::UnresolvedIri(reference.to_string()))
    }

    /// Expands a term, compact IRI or (relative) IRI.
    ///
    /// Vocabulary positions (properties, types) use term definitions and
    /// `@vocab`; other positions resolve relative references against the base.
    pub fn expand_iri(&self, value: &str, vocab: bool) -> Result<String, TurtleError> {
        if vocab {
            if let Some(id) = self.terms.get(value).and_then(|d| d.id.as_deref()) {
                if id != value {
                    return self.expand_iri(id, true);
                }
            }
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if prefix == "_" || suffix.starts_with("//") {
                return Ok(value.to_string());
            }
            if let Some(ns) = self.terms.get(prefix).and_then(|d| d.id.as_deref()) {
                return Ok(format!("{ns}{suffix}"));
            }
            return Ok(value.to_string());
        }
        if vocab {
            if let Some(v) = &self.vocab {
                return Ok(format!("{v}{value}"));
            }
            return Err(TurtleError::UnresolvedIri(value.to_string()));
        }
        self.resolve(value).map(String::from)
    }

    /// Returns the prefixes usable for compact output, sorted by prefix.
    #[must_use]
    pub fn prefixes(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .terms
            .iter()
            .filter_map(|(p, d)| {
                let ns = d.id.as_deref()?;
                let usable = (ns.ends_with('/') || ns.ends_with('#'))
                    && ns.contains("://")
                    && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                    && p.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
                usable.then(|| (p.clone(), ns.to_string()))
            })
            .collect();
        out.sort();
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Iri(String),
    Blank(usize),
    Literal {
        value: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
    List(Vec<Term>),
}

#[derive(Default)]
struct Graph {
    triples: Vec<(Term, String, Term)>,
    blanks: usize,
}

impl Graph {
    fn new_blank(&mut self) -> Term {
        self.blanks += 1;
        Term::Blank(self.blanks)
    }

    fn node(&mut self, node: &Map<String, Value>, ctx: &JsonLdContext) -> Result<Term, TurtleError> {
        let subject = match node.get(jsonld::ID).and_then(Value::as_str) {
            Some(id) => Term::Iri(ctx.expand_iri(id, false)?),
            None => self.new_blank(),
        };
        let types = match node.get(jsonld::TYPE) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(t)) => vec![t.as_str()],
            _ => Vec::new(),
        };
        for t in types {
            let iri = ctx.expand_iri(t, true)?;
            self.triples.push((subject.clone(), RDF_TYPE.to_string(), Term::Iri(iri)));
        }
        for (key, value) in node {
            if key.starts_with('@') {
                continue;
            }
            let Ok(predicate) = ctx.expand_iri(key, true) else {
                debug!(term = %key, "dropping unmapped term");
                continue;
            };
            let def = ctx.terms.get(key).cloned().unwrap_or_default();
            let items: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            if def.list {
                let mut members = Vec::new();
                for item in items {
                    if let Some(t) = self.object(item, &def, ctx)? {
                        members.push(t);
                    }
                }
                self.triples.push((subject.clone(), predicate, Term::List(members)));
                continue;
            }
            for item in items {
                if let Some(t) = self.object(item, &def, ctx)? {
                    self.triples.push((subject.clone(), predicate.clone(), t));
                }
            }
        }
        Ok(subject)
    }

    fn object(&mut self, value: &Value, def: &TermDef, ctx: &JsonLdContext) -> Result<Option<Term>, TurtleError> {
        let term = match value {
            Value::Null => return Ok(None),
            Value::String(s) if def.id_valued => Term::Iri(ctx.expand_iri(s, false)?),
            Value::String(s) => Term::Literal {
                value: s.clone(),
                datatype: def.datatype.as_deref().map(|d| ctx.expand_iri(d, true)).transpose()?,
                lang: None,
            },
            Value::Bool(b) => Term::Literal {
                value: b.to_string(),
                datatype: Some(format!("{XSD}boolean")),
                lang: None,
            },
            Value::Number(n) => Term::Literal {
                value: n.to_string(),
                datatype: Some(if n.is_f64() {
                    format!("{XSD}double")
                } else {
                    format!("{XSD}integer")
                }),
                lang: None,
            },
            Value::Array(items) => {
                let mut members = Vec::new();
                for item in items {
                    if let Some(t) = self.object(item, def, ctx)? {
                        members.push(t);
                    }
                }
                Term::List(members)
            }
            Value::Object(obj) => {
                if let Some(v) = obj.get("@value") {
                    Term::Literal {
                        value: v.as_str().map_or_else(|| v.to_string(), str::to_string),
                        datatype: obj
                            .get(jsonld::TYPE)
                            .and_then(Value::as_str)
                            .map(|d| ctx.expand_iri(d, true))
                            .transpose()?,
                        lang: obj.get("@language").and_then(Value::as_str).map(str::to_string),
                    }
                } else if let Some(Value::Array(list)) = obj.get(jsonld::LIST) {
                    let inner = TermDef {
                        list: false,
                        ..def.clone()
                    };
                    return self.object(&Value::Array(list.clone()), &inner, ctx);
                } else {
                    self.node(obj, ctx)?
                }
            }
        };
        Ok(Some(term))
    }
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct Writer<'a> {
    prefixes: &'a [(String, String)],
}

impl Writer<'_> {
    fn iri(&self, iri: &str) -> Result<String, TurtleError> {
        if iri == RDF_TYPE {
            return Ok("a".to_string());
        }
        for (prefix, ns) in self.prefixes {
            if let Some(local) = iri.strip_prefix(ns.as_str()) {
                if local.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                    && !local.starts_with('-')
                {
                    return Ok(format!("{prefix}:{local}"));
                }
            }
        }
        if iri
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'))
        {
            return Err(TurtleError::InvalidIri(iri.to_string()));
        }
        Ok(format!("<{iri}>"))
    }

    fn term(&self, term: &Term) -> Result<String, TurtleError> {
        Ok(match term {
            Term::Iri(iri) => self.iri(iri)?,
            Term::Blank(n) => format!("_:b{n}"),
            Term::Literal { value, datatype, lang } => {
                let mut out = escape_literal(value);
                if let Some(lang) = lang {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = datatype.as_deref().filter(|d| *d != format!("{XSD}string")) {
                    out.push_str("^^");
                    out.push_str(&self.iri(dt)?);
                }
                out
            }
            Term::List(items) => {
                let parts = items.iter().map(|t| self.term(t)).collect::<Result<Vec<_>, _>>()?;
                if parts.is_empty() {
                    "()".to_string()
                } else {
                    format!("( {} )", parts.join(" "))
                }
            }
        })
    }
}

/// Converts a JSON-LD document to Turtle.
///
/// `contexts` are the already-loaded context objects, in order, and `base`
/// the document IRI used for relative references.
///
/// # Errors
/// Context errors, unresolvable IRIs and IRIs Turtle cannot express.
pub fn jsonld_to_turtle(document: &Value, contexts: &[Value], base: Option<Url>) -> Result<String, TurtleError> {
    let mut ctx = JsonLdContext::new(base);
    for c in contexts {
        ctx.merge(c)?;
    }
    let mut graph = Graph::default();
    match document {
        Value::Object(node) => {
            if let Some(Value::Array(nodes)) = node.get("@graph") {
                for n in nodes {
                    let Value::Object(n) = n else {
                        return Err(TurtleError::NotANode(n.to_string()));
                    };
                    graph.node(n, &ctx)?;
                }
            } else {
                graph.node(node, &ctx)?;
            }
        }
        other => return Err(TurtleError::NotANode(other.to_string())),
    }

    let prefixes = ctx.prefixes();
    let writer = Writer { prefixes: &prefixes };
    let mut out = String::new();
    for (prefix, ns) in &prefixes {
        let _ = writeln!(out, "@prefix {prefix}: <{ns}> .");
    }
    if !prefixes.is_empty() {
        out.push('\n');
    }

    let mut subjects: Vec<&Term> = Vec::new();
    for (s, _, _) in &graph.triples {
        if !subjects.contains(&s) {
            subjects.push(s);
        }
    }
    for subject in subjects {
        let _ = write!(out, "{}", writer.term(subject)?);
        let mut predicates: Vec<&str> = Vec::new();
        for (s, p, _) in &graph.triples {
            if s == subject && !predicates.contains(&p.as_str()) {
                predicates.push(p.as_str());
            }
        }
        for (i, p) in predicates.iter().enumerate() {
            let objects = graph
                .triples
                .iter()
                .filter(|(s, pp, _)| s == subject && pp.as_str() == *p)
                .map(|(_, _, o)| writer.term(o))
                .collect::<Result<Vec<_>, _>>()?;
            let sep = if i == 0 { "\n    " } else { " ;\n    " };
            let _ = write!(out, "{sep}{} {}", writer.iri(p)?, objects.join(" , "));
        }
        out.push_str(" .\n\n");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "annal": "http://purl.org/annalist/2014/#",
            "rdfs": "http://www.w3.org/2000/01/rdf-schema#",
            "ex": "http://example.org/ns/",
            "ex:ref": {"@type": "@id"},
            "ex:seq": {"@container": "@list"}
        })
    }

    fn base() -> Option<Url> {
        Url::parse("http://example.org/c/coll/d/t1/e1/entity_data.jsonld").ok()
    }

    #[test]
    fn test_simple_entity() {
        let doc = json!({
            "@id": "t1/e1/",
            "@type": ["ex:Thing", "annal:EntityData"],
            "rdfs:label": "Entity \"one\"",
            "ex:count": 3,
            "ex:ref": "t1/e2/"
        });
        let ttl = jsonld_to_turtle(&doc, &[json!({"@base": "../../"}), context()], base()).unwrap();
        assert!(ttl.contains("@prefix ex: <http://example.org/ns/> ."));
        assert!(ttl.contains("<http://example.org/c/coll/d/t1/e1/>"));
        assert!(ttl.contains("a ex:Thing , annal:EntityData"));
        assert!(ttl.contains("rdfs:label \"Entity \\\"one\\\"\""));
        assert!(ttl.contains("ex:count \"3\"^^<http://www.w3.org/2001/XMLSchema#integer>"));
        assert!(ttl.contains("ex:ref <http://example.org/c/coll/d/t1/e2/>"));
        assert!(ttl.trim_end().ends_with(" ."));
    }

    #[test]
    fn test_nested_nodes_and_lists() {
        let doc = json!({
            "@id": "./",
            "ex:seq": ["a", "b"],
            "ex:part": [{"rdfs:label": "inner"}],
            "ex:note": {"@value": "bonjour", "@language": "fr"}
        });
        let ttl = jsonld_to_turtle(&doc, &[context()], base()).unwrap();
        assert!(ttl.contains("ex:seq ( \"a\" \"b\" )"));
        assert!(ttl.contains("ex:part _:b1"));
        assert!(ttl.contains("_:b1\n    rdfs:label \"inner\" ."));
        assert!(ttl.contains("\"bonjour\"@fr"));
    }

    #[test]
    fn test_graph_is_flattened() {
        let doc = json!({"@graph": [
            {"@id": "http://example.org/a", "rdfs:label": "first"},
            {"@id": "http://example.org/b", "rdfs:label": "second"}
        ]});
        let ttl = jsonld_to_turtle(&doc, &[context()], None).unwrap();
        assert!(ttl.contains("<http://example.org/a>"));
        assert!(ttl.contains("<http://example.org/b>"));
        assert!(ttl.contains("\"first\"") && ttl.contains("\"second\""));
    }

    #[test]
    fn test_unmapped_terms_are_dropped() {
        let doc = json!({"@id": "http://example.org/x", "plain": "dropped", "rdfs:label": "kept"});
        let ttl = jsonld_to_turtle(&doc, &[context()], None).unwrap();
        assert!(!ttl.contains("dropped"));
        assert!(ttl.contains("kept"));
    }

    #[test]
    fn test_errors() {
        let doc = json!({"@id": "relative/"});
        assert_eq!(
            jsonld_to_turtle(&doc, &[], None),
            Err(TurtleError::UnresolvedIri("relative/".to_string()))
        );
        assert!(matches!(
            jsonld_to_turtle(&doc, &[json!("not an object")], base()),
            Err(TurtleError::InvalidContext(_))
        ));
        assert!(matches!(jsonld_to_turtle(&json!([1]), &[], base()), Err(TurtleError::NotANode(_))));
        let bad = json!({"@id": "http://example.org/a b"});
        assert!(matches!(jsonld_to_turtle(&bad, &[], None), Err(TurtleError::InvalidIri(_))));
    }
}
