//! `$ref` string parsing and normalization.
//!
//! A `$ref` has the shape `<file-or-url>#<json-pointer>`. The file part is
//! resolved against the referencing document (POSIX-style for paths,
//! `Url::join` for URLs) and the pointer is percent-decoded, so every
//! spelling of the same location yields one normalized string.

use url::Url;

use crate::pointer::JsonPointer;

/// A `$ref` resolved against the document it appears in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    /// File identity of the target document.
    pub file: String,
    /// Pointer into the target document.
    pub pointer: JsonPointer,
    /// Fragment exactly as written (without `#`), used for local rewrites.
    pub raw_pointer: String,
    /// `file#pointer`, the identity used by every cache.
    pub normalized: String,
    /// True when the `$ref` had no file part.
    pub local: bool,
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Build the normalized form of `file` + `pointer`.
pub fn build_ref(file: &str, pointer: &JsonPointer) -> String {
    format!("{}#{}", file, pointer)
}

/// Parse a `$ref` value relative to `base` (the referencing file).
pub fn parse_ref(reference: &str, base: &str) -> ParsedRef {
    let (file_part, fragment) = match reference.find('#') {
        Some(idx) => (&reference[..idx], &reference[idx + 1..]),
        None => (reference, ""),
    };

    let file = resolve_file(file_part, base);
    let pointer = JsonPointer::parse(&percent_decode(fragment));
    let normalized = build_ref(&file, &pointer);

    ParsedRef {
        file,
        pointer,
        raw_pointer: fragment.to_string(),
        normalized,
        local: file_part.is_empty(),
    }
}

/// Resolve the file part of a `$ref` against the referencing file.
pub fn resolve_file(file_part: &str, base: &str) -> String {
    if file_part.is_empty() {
        return base.to_string();
    }
    if is_url(file_part) {
        return Url::parse(file_part)
            .map(String::from)
            .unwrap_or_else(|_| file_part.to_string());
    }
    if is_url(base) {
        if let Ok(joined) = Url::parse(base).and_then(|b| b.join(file_part)) {
            return joined.into();
        }
    }
    relative_path(file_part, base)
}

/// Resolve `path` relative to the file `base`.
///
/// The last segment of `base` (its file name) is replaced by `path`.
pub fn relative_path(path: &str, base: &str) -> String {
    if base.is_empty() || path.starts_with('/') {
        return normalize_path(path);
    }
    if path.is_empty() {
        return normalize_path(base);
    }
    let mut segments: Vec<&str> = base.split('/').collect();
    if let Some(last) = segments.last_mut() {
        *last = path;
    }
    normalize_path(&segments.join("/"))
}

/// POSIX-normalize a path: percent-decode, collapse `.` and `..`.
///
/// Relative paths keep leading `..` segments, absolute paths drop them.
/// A trailing slash is preserved and an empty result becomes `"."`.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let decoded = percent_decode(path);
    let absolute = decoded.starts_with('/');
    let trailing = decoded.ends_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if !absolute => parts.push(".."),
                _ => {}
            },
            other => parts.push(other),
        }
    }

    let mut normalized = parts.join("/");
    if normalized.is_empty() && !absolute {
        normalized.push('.');
    }
    if !parts.is_empty() && trailing {
        normalized.push('/');
    }
    if absolute {
        normalized.insert(0, '/');
    }
    normalized
}

/// Derive a definition name from a file path or pointer tail.
///
/// `schemas/User.yaml` → `User`.
pub fn filename(s: &str) -> String {
    let name = s.rsplit('/').next().unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    for ext in [".json", ".yaml", ".yml"] {
        if lower.ends_with(ext) {
            return name[..name.len() - ext.len()].to_string();
        }
    }
    name.to_string()
}

fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    urlencoding::decode(s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| s.to_string())
}
