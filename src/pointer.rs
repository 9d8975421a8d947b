//! JSON Pointer (RFC 6901) handling and traversal paths.

use std::fmt;

use serde_json::{Map, Value};

/// One step of a traversal path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

impl PathKey {
    /// Segment text as it appears in a pointer (unescaped).
    pub fn as_segment(&self) -> String {
        match self {
            PathKey::Key(k) => k.clone(),
            PathKey::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Key(k) => f.write_str(k),
            PathKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

/// Location of a node relative to the root of a traversal.
pub type JsonPath = Vec<PathKey>;

/// Convert a traversal path to a pointer.
pub fn path_to_pointer(path: &[PathKey]) -> JsonPointer {
    JsonPointer {
        segments: path.iter().map(PathKey::as_segment).collect(),
    }
}

/// Escape a single pointer segment (`~` → `~0`, `/` → `~1`).
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Unescape a single pointer segment (`~1` → `/`, then `~0` → `~`).
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// An ordered list of unescaped pointer segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    /// The empty pointer, addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a pointer such as `/definitions/a~1b`, `#/x` or `""`.
    ///
    /// Empty segments are skipped, so `"/"` and `""` both address the root.
    pub fn parse(pointer: &str) -> Self {
        let pointer = pointer.strip_prefix('#').unwrap_or(pointer);
        let segments = pointer
            .split('/')
            .filter(|s| !s.is_empty())
            .map(unescape_segment)
            .collect();
        Self { segments }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.push(segment);
        child
    }

    pub fn join(&self, other: &JsonPointer) -> Self {
        let mut joined = self.clone();
        joined.segments.extend(other.segments.iter().cloned());
        joined
    }

    /// Pointer to the parent node, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Remaining segments after `prefix`, if `prefix` is one.
    pub fn strip_prefix(&self, prefix: &JsonPointer) -> Option<Self> {
        self.segments
            .strip_prefix(prefix.segments.as_slice())
            .map(|rest| Self {
                segments: rest.to_vec(),
            })
    }

    /// `#`-prefixed fragment form, used as a local `$ref` target.
    pub fn to_fragment(&self) -> String {
        format!("#{}", self)
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", escape_segment(segment))?;
        }
        Ok(())
    }
}

impl From<&[PathKey]> for JsonPointer {
    fn from(path: &[PathKey]) -> Self {
        path_to_pointer(path)
    }
}

/// Look up one segment in an object or array.
pub fn get_child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

/// Walk a pointer into a value. No `$ref` following.
pub fn get_by_pointer<'v>(value: &'v Value, pointer: &JsonPointer) -> Option<&'v Value> {
    pointer
        .segments()
        .iter()
        .try_fold(value, |current, segment| get_child(current, segment))
}

/// Write `new_value` at `pointer`, creating intermediate objects.
///
/// Intermediates that are not containers are replaced by empty objects.
/// Writing at the root replaces the whole value.
pub fn set_by_pointer(target: &mut Value, pointer: &JsonPointer, new_value: Value) {
    let Some((last, parents)) = pointer.segments().split_last() else {
        *target = new_value;
        return;
    };

    let mut current = target;
    for segment in parents {
        current = child_slot(current, segment);
    }

    if let Value::Array(arr) = current {
        if let Some(i) = last.parse::<usize>().ok().filter(|i| *i <= arr.len()) {
            if i == arr.len() {
                arr.push(new_value);
            } else {
                arr[i] = new_value;
            }
            return;
        }
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), new_value);
    }
}

fn child_slot<'v>(value: &'v mut Value, segment: &str) -> &'v mut Value {
    let index = match &*value {
        Value::Array(arr) => segment.parse::<usize>().ok().filter(|i| *i < arr.len()),
        _ => None,
    };

    match (index, value) {
        (Some(i), Value::Array(arr)) => &mut arr[i],
        (_, value) => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            match value {
                Value::Object(map) => {
                    let slot = map
                        .entry(segment.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !slot.is_object() && !slot.is_array() {
                        *slot = Value::Object(Map::new());
                    }
                    slot
                }
                other => other,
            }
        }
    }
}
