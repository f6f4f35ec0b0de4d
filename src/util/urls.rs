//! URL composition helpers and continuation chains.
//!
//! A continuation URL is a return destination carried in the
//! `continuation_url` query parameter. Because the destination may itself
//! carry a continuation, the parameter encodes a stack that each successive
//! operation can unwind.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Ordered query parameters.
pub type UriParams = Vec<(String, String)>;

/// Name of the continuation query parameter.
pub const CONTINUATION_PARAM: &str = "continuation_url";

/// Characters left unescaped in query parameter values: RFC 3986
/// delimiters and unreserved marks, minus `?`, `&` and `#`.
const QUERY_SAFE: &str = ":/[]@!$'()*+,;=-._~";

/// Percent-encodes a query parameter value.
#[must_use]
pub fn quote_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || QUERY_SAFE.contains(ch) {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(ch.encode_utf8(&mut buf)));
        }
    }
    out
}

fn unquote_param(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned())
}

/// Builds a query string from parameters, skipping absent values.
///
/// Returns `""` when no value is present, otherwise `?k=v&k2=v2`.
#[must_use]
pub fn uri_params(params: &[(&str, Option<&str>)]) -> String {
    let mut out = String::new();
    for (name, value) in params {
        if let Some(value) = value {
            out.push(if out.is_empty() { '?' } else { '&' });
            out.push_str(name);
            out.push('=');
            out.push_str(&quote_param(value));
        }
    }
    out
}

/// Strips any fragment and query from a URI.
#[must_use]
pub fn uri_base(uri: &str) -> &str {
    let uri = uri.split('#').next().unwrap_or(uri);
    uri.split('?').next().unwrap_or(uri)
}

/// Replaces the query of `base` with the given parameters.
#[must_use]
pub fn uri_with_params(base: &str, params: &[(&str, Option<&str>)]) -> String {
    format!("{}{}", uri_base(base), uri_params(params))
}

/// Extracts the query parameters of a URI in order of appearance.
///
/// Values are percent-decoded. A parameter without `=` has an empty value.
#[must_use]
pub fn uri_param_dict(uri: &str) -> UriParams {
    let uri = uri.split('#').next().unwrap_or(uri);
    let Some((_, query)) = uri.split_once('?') else {
        return Vec::new();
    };
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (unquote_param(k), unquote_param(v)),
            None => (unquote_param(p), String::new()),
        })
        .collect()
}

/// Selects the parameters that carry application state across a continuation.
///
/// Returns `continuation_url` and `search`, where `search` is taken from
/// `search_for` or else `search`. Empty values are treated as absent.
#[must_use]
pub fn continuation_params(params: &[(String, String)]) -> Vec<(&'static str, Option<String>)> {
    let get = |name: &str| {
        params
            .iter()
            .rev()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.clone())
    };
    vec![
        (CONTINUATION_PARAM, get(CONTINUATION_PARAM)),
        ("search", get("search_for").or_else(|| get("search"))),
    ]
}

/// Disassembles a continuation URL into its stack of `(base, params)` frames.
///
/// The first frame is the URL itself, with its `continuation_url` parameter
/// removed; each following frame comes from the nested continuation.
#[must_use]
pub fn continuation_url_chain(continuation_url: &str) -> Vec<(String, UriParams)> {
    let mut chain = Vec::new();
    let mut next = Some(continuation_url.to_string());
    while let Some(url) = next.take() {
        let mut params = uri_param_dict(&url);
        if let Some(pos) = params.iter().position(|(k, _)| k == CONTINUATION_PARAM) {
            next = Some(params.remove(pos).1);
        }
        chain.push((uri_base(&url).to_string(), params));
    }
    chain
}

/// Reassembles a continuation URL from a stack of `(base, params)` frames.
///
/// Inverse of [`continuation_url_chain`]. An empty chain gives `""`.
#[must_use]
pub fn continuation_chain_url(chain: &[(String, UriParams)]) -> String {
    let mut url: Option<String> = None;
    for (base, params) in chain.iter().rev() {
        let mut pairs: Vec<(&str, Option<&str>)> = params
            .iter()
            .filter(|(k, _)| k != CONTINUATION_PARAM)
            .map(|(k, v)| (k.as_str(), Some(v.as_str())))
            .collect();
        pairs.push((CONTINUATION_PARAM, url.as_deref()));
        url = Some(uri_with_params(base, &pairs));
    }
    url.unwrap_or_default()
}

fn join_url(base: &str, reference: &str) -> Option<Url> {
    match Url::parse(base) {
        Ok(base) => base.join(reference).ok(),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let root = Url::parse("http://localhost/").ok()?;
            root.join(base).ok()?.join(reference).ok()
        }
        Err(_) => None,
    }
}

fn authority(uri: &str) -> Option<&str> {
    let rest = if let Some(pos) = uri.find("://") {
        &uri[pos + 3..]
    } else {
        uri.strip_prefix("//")?
    };
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let auth = &rest[..end];
    Some(auth.rsplit_once('@').map_or(auth, |(_, hostport)| hostport))
}

/// Returns the host (with an explicit port, if any) of an entity reference
/// resolved against `base`, as it would appear in an HTTP `Host:` header.
#[must_use]
pub fn entity_url_host(base: &str, reference: &str) -> String {
    let source = if authority(reference).is_some() { reference } else { base };
    let Some(hostport) = authority(source) else {
        return String::new();
    };
    match hostport.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}:{port}", host.to_ascii_lowercase())
        }
        _ => hostport.trim_end_matches(':').to_ascii_lowercase(),
    }
}

/// Returns the absolute path of an entity reference resolved against `base`,
/// excluding any query or fragment.
#[must_use]
pub fn entity_url_path(base: &str, reference: &str) -> String {
    join_url(base, reference).map_or_else(
        || uri_base(reference).to_string(),
        |url| url.path().to_string(),
    )
}

/// Resolves a reference against a base URL.
///
/// Relative bases (such as `/site/c/coll/`) are supported: the result is
/// then an absolute path.
#[must_use]
pub fn resolve_url(base: &str, reference: &str) -> String {
    let relative_base = matches!(Url::parse(base), Err(url::ParseError::RelativeUrlWithoutBase));
    let Some(url) = join_url(base, reference) else {
        return format!("{base}{reference}");
    };
    if relative_base && Url::parse(reference).is_err() {
        let mut out = url.path().to_string();
        if let Some(q) = url.query() {
            out.push('?');
            out.push_str(q);
        }
        if let Some(f) = url.fragment() {
            out.push('#');
            out.push_str(f);
        }
        out
    } else {
        url.to_string()
    }
}

/// Builds the URL of a resource attached to an entity.
#[must_use]
pub fn make_resource_url(base: &str, entity_ref: &str, resource_ref: &str) -> String {
    let entity_url = resolve_url(base, entity_ref);
    resolve_url(uri_base(&entity_url), resource_ref)
}

static DATA_URL_RE: OnceLock<Option<Regex>> = OnceLock::new();
static LIST_URL_RE: OnceLock<Option<Regex>> = OnceLock::new();
static VIEW_URL_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn url_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Rewrites the type and entity ids embedded in an entity URL after a rename.
///
/// Recognized path forms are `.../d/<type>/[<entity>/][!<scope>]`,
/// `.../l/<list>/<type>/[!<scope>]` and
/// `.../v/<view>/<type>/[<entity>/][!<action>]`. The type id is replaced when
/// it equals `old_type_id`; the entity id is replaced only when the type also
/// matched and the entity equals `old_entity_id`. Unrecognized URLs are
/// returned unchanged.
#[must_use]
pub fn url_update_type_entity_id(
    url: &str,
    old_type_id: &str,
    new_type_id: &str,
    old_entity_id: Option<&str>,
    new_entity_id: Option<&str>,
) -> String {
    let split = url.find(['?', '#']).unwrap_or(url.len());
    let (path, tail) = url.split_at(split);

    let patterns = [
        url_regex(&DATA_URL_RE, r"^(.*/d/)(\w+)/(?:(\w+)/)?(!.*)?$"),
        url_regex(&LIST_URL_RE, r"^(.*/l/\w+/)(\w+)/()(!.*)?$"),
        url_regex(&VIEW_URL_RE, r"^(.*/v/\w+/)(\w+)/(?:(\w+)/)?(!.*)?$"),
    ];
    for re in patterns.into_iter().flatten() {
        let Some(caps) = re.captures(path) else {
            continue;
        };
        let prefix = caps.get(1).map_or("", |m| m.as_str());
        let type_id = caps.get(2).map_or("", |m| m.as_str());
        let entity_id = caps.get(3).map(|m| m.as_str()).filter(|e| !e.is_empty());
        let action = caps.get(4).map_or("", |m| m.as_str());
        if type_id != old_type_id {
            return url.to_string();
        }
        let entity_id = match (entity_id, old_entity_id, new_entity_id) {
            (Some(e), Some(old), Some(new)) if e == old => Some(new),
            (e, _, _) => e,
        };
        let mut out = format!("{prefix}{new_type_id}/");
        if let Some(entity_id) = entity_id {
            out.push_str(entity_id);
            out.push('/');
        }
        out.push_str(action);
        out.push_str(tail);
        return out;
    }
    url.to_string()
}
