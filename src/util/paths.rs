//! Filesystem helpers for the site tree.
//!
//! Bodies are replaced atomically: the new content goes to a uniquely named
//! temporary file in the same directory, is synced, and then renamed over
//! the target.

use std::fs::{self, OpenOptions};
use std::io::{Result as IoResult, Write};
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

/// Assembles the directory and body file path for an entity.
///
/// `segments` is any sequence of relative path segments (possibly empty),
/// and `filename` may itself contain a subdirectory. Returns
/// `(directory, full_path)` where `directory` is the parent of `full_path`.
pub fn entity_dir_path<I, S>(base: &Path, segments: I, filename: &str) -> (PathBuf, PathBuf)
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    let mut dir = base.to_path_buf();
    for seg in segments {
        let seg = seg.as_ref();
        if !seg.as_os_str().is_empty() {
            dir.push(seg);
        }
    }
    let full = dir.join(filename);
    let dir = full.parent().map_or(dir, Path::to_path_buf);
    (dir, full)
}

/// Like [`entity_dir_path`], but returns `None` when the directory is missing.
pub fn entity_path<I, S>(base: &Path, segments: I, filename: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    let (dir, full) = entity_dir_path(base, segments, filename);
    dir.is_dir().then_some(full)
}

/// Replaces `//` comment lines with blank lines so line numbers are preserved.
#[must_use]
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("//") {
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Lexically normalizes a path, resolving `.` and `..` without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns true if `path` is `ancestor` or lies beneath it.
#[must_use]
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    normalize(path).starts_with(normalize(ancestor))
}

/// Writes a JSON document to `path`, replacing any existing file atomically.
///
/// The document is pretty-printed with two-space indentation. Object keys
/// come out sorted because `serde_json::Map` is ordered by key.
pub fn write_json_atomic(path: &Path, value: &Value) -> IoResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .map_or_else(|| "body".into(), |n| n.to_string_lossy().into_owned());
    let tmp = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));

    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');

    let result = (|| {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Reads and parses a JSON document, ignoring `//` comment lines.
pub fn read_json(path: &Path) -> IoResult<Value> {
    let text = fs::read_to_string(path)?;
    let value = serde_json::from_str(&strip_comments(&text))?;
    Ok(value)
}

/// Lists the names of directory entries, sorted. A missing directory gives an empty list.
pub fn list_dir(dir: &Path) -> IoResult<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
