//! Session-scoped document cache and JSON Pointer lookup.
//!
//! A [`Resolver`] lives for one dereference or bundle call. It fetches each
//! file identity at most once and walks pointers into the fetched
//! documents, following `$ref` objects it meets half-way through a pointer.
//! Every failure below this boundary is "absent", never an error.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::RefError;
use crate::loader::{Document, Fetcher};
use crate::pointer::{get_by_pointer, get_child, JsonPointer};
use crate::refs::parse_ref;
use crate::value::{merge_sibling, split_ref};

type Slot = Arc<OnceCell<Option<Arc<Document>>>>;

/// Result of a pointer lookup: the file the value came from, and the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// File identity after following any `$ref` on the way.
    pub file: String,
    /// `None` when the pointer could not be resolved.
    pub value: Option<Value>,
}

impl Resolved {
    fn absent(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            value: None,
        }
    }
}

/// Loads documents through a [`Fetcher`] and memoizes them per session.
pub struct Resolver<'f> {
    fetcher: &'f dyn Fetcher,
    base_file: String,
    cache: Mutex<HashMap<String, Slot>>,
}

impl<'f> Resolver<'f> {
    pub fn new(base_file: impl Into<String>, fetcher: &'f dyn Fetcher) -> Self {
        Self {
            fetcher,
            base_file: base_file.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// File identity of the entry document.
    pub fn base_file(&self) -> &str {
        &self.base_file
    }

    /// Seed the cache with an in-memory document, bypassing the fetcher.
    pub fn preload(&self, file: impl Into<String>, document: Document) {
        let slot = Slot::default();
        let _ = slot.set(Some(Arc::new(document)));
        self.cache.lock().insert(file.into(), slot);
    }

    /// Number of distinct files requested so far.
    pub fn cached_files(&self) -> usize {
        self.cache.lock().len()
    }

    /// Fetch `file` once; later calls return the cached outcome.
    pub fn resolve(&self, file: &str) -> Option<Arc<Document>> {
        let slot = self.cache.lock().entry(file.to_string()).or_default().clone();
        slot.get_or_init(|| match self.fetcher.fetch(file) {
            Ok(document) => {
                debug!(file, "fetched document");
                Some(Arc::new(document))
            }
            Err(err) => {
                debug!(file, error = %err, "fetch failed, treating source as absent");
                None
            }
        })
        .clone()
    }

    /// Entry node of the session.
    ///
    /// Unlike every other lookup this one reports why it failed.
    ///
    /// # Errors
    ///
    /// Returns `RefError::SourceUnavailable` carrying the fetch error, or
    /// `RefError::PointerUnavailable` if `pointer` is not in the document.
    pub fn entry(&self, pointer: &JsonPointer) -> Result<Value, RefError> {
        let loaded = self
            .cache
            .lock()
            .get(&self.base_file)
            .is_some_and(|slot| matches!(slot.get(), Some(Some(_))));
        if !loaded {
            let document =
                self.fetcher
                    .fetch(&self.base_file)
                    .map_err(|source| RefError::SourceUnavailable {
                        source_id: self.base_file.clone(),
                        source,
                    })?;
            self.preload(self.base_file.clone(), document);
        }
        self.base(pointer).ok_or_else(|| RefError::PointerUnavailable {
            source_id: self.base_file.clone(),
            pointer: pointer.to_string(),
        })
    }

    /// Node at `pointer` in the entry document, without `$ref` following.
    pub fn base(&self, pointer: &JsonPointer) -> Option<Value> {
        let document = self.resolve(&self.base_file)?;
        match document.as_ref() {
            Document::Json(value) => get_by_pointer(value, pointer).cloned(),
            Document::Text(text) if pointer.is_root() => Some(Value::String(text.clone())),
            Document::Text(_) => None,
        }
    }

    /// Walk `pointer` into `file`, following `$ref`s met before the
    /// pointer is exhausted. `sibling` is merged into the result.
    pub fn resolve_pointer(
        &self,
        pointer: &JsonPointer,
        file: &str,
        sibling: Option<&Map<String, Value>>,
    ) -> Resolved {
        self.walk(pointer, file, sibling, &mut HashSet::new())
    }

    /// Resolve a `$ref` string relative to `file`.
    pub fn resolve_ref(
        &self,
        reference: &str,
        file: &str,
        sibling: Option<&Map<String, Value>>,
    ) -> Resolved {
        let parsed = parse_ref(reference, file);
        self.resolve_pointer(&parsed.pointer, &parsed.file, sibling)
    }

    /// Like [`resolve_pointer`](Self::resolve_pointer), but a `$ref` found at
    /// the target is followed as well.
    pub fn resolve_pointer_ref(
        &self,
        pointer: &JsonPointer,
        file: &str,
        sibling: Option<&Map<String, Value>>,
    ) -> Resolved {
        self.walk_ref(pointer, file, sibling, &mut HashSet::new())
    }

    fn walk_ref(
        &self,
        pointer: &JsonPointer,
        file: &str,
        sibling: Option<&Map<String, Value>>,
        visited: &mut HashSet<String>,
    ) -> Resolved {
        let resolved = self.walk(pointer, file, sibling, visited);
        let Some((Ok(target), rest)) = resolved.value.as_ref().and_then(split_ref) else {
            return resolved;
        };

        let parsed = parse_ref(target, &resolved.file);
        if !visited.insert(parsed.normalized.clone()) {
            debug!(reference = %parsed.normalized, "$ref chain revisits itself");
            return Resolved::absent(resolved.file);
        }
        let rest = (!rest.is_empty()).then_some(rest);
        self.walk_ref(&parsed.pointer, &parsed.file, rest.as_ref(), visited)
    }

    fn walk(
        &self,
        pointer: &JsonPointer,
        file: &str,
        sibling: Option<&Map<String, Value>>,
        visited: &mut HashSet<String>,
    ) -> Resolved {
        let Some(document) = self.resolve(file) else {
            return Resolved::absent(file);
        };
        let data = match document.as_ref() {
            Document::Json(value) => value,
            Document::Text(text) if pointer.is_root() => {
                return Resolved {
                    file: file.to_string(),
                    value: Some(Value::String(text.clone())),
                }
            }
            Document::Text(_) => return Resolved::absent(file),
        };

        let mut file = file.to_string();
        let mut current = Cow::Borrowed(data);
        for segment in pointer.segments() {
            if get_child(&current, segment).is_some() {
                current = match current {
                    Cow::Borrowed(value) => match get_child(value, segment) {
                        Some(child) => Cow::Borrowed(child),
                        None => return Resolved::absent(file),
                    },
                    Cow::Owned(value) => match take_child(value, segment) {
                        Some(child) => Cow::Owned(child),
                        None => return Resolved::absent(file),
                    },
                };
                continue;
            }

            // the segment lives behind a $ref: resolve it and keep walking
            let Some((Ok(target), rest)) = split_ref(&current) else {
                return Resolved::absent(file);
            };
            let parsed = parse_ref(target, &file);
            if !visited.insert(parsed.normalized.clone()) {
                debug!(reference = %parsed.normalized, "pointer walk revisits $ref");
                return Resolved::absent(file);
            }
            trace!(reference = %parsed.normalized, segment, "following $ref mid-pointer");

            let rest = (!rest.is_empty()).then_some(rest);
            let inner = self.walk_ref(&parsed.pointer, &parsed.file, rest.as_ref(), visited);
            file = inner.file;
            match inner.value.and_then(|value| take_child(value, segment)) {
                Some(child) => current = Cow::Owned(child),
                None => return Resolved::absent(file),
            }
        }

        Resolved {
            file,
            value: Some(merge_sibling(current.into_owned(), sibling)),
        }
    }
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("base_file", &self.base_file)
            .field("cached_files", &self.cached_files())
            .finish()
    }
}

/// Move one child out of an owned container.
fn take_child(value: Value, segment: &str) -> Option<Value> {
    match value {
        Value::Object(mut map) => map.remove(segment),
        Value::Array(arr) => {
            let index = segment.parse::<usize>().ok()?;
            arr.into_iter().nth(index)
        }
        _ => None,
    }
}
