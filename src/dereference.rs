//! Replace every `$ref` with the content it points to.
//!
//! The pass is one [`CrawlHook`] over the entry document. Each `$ref` is
//! resolved through the session [`Resolver`], merged with its sibling
//! keys and crawled again with a new ancestor frame. A `$ref` whose target
//! is already on the ancestor stack is cut: left as a local `$ref` to the
//! ancestor, or, with circular mode on, recorded in a [`CycleMap`] and
//! turned into a real back-edge of the resulting [`Graph`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::crawler::{CrawlContext, CrawlHook, Crawler, ExitHook, HookResponse};
use crate::error::RefError;
use crate::graph::{CycleMap, Graph};
use crate::loader::{Document, Fetcher};
use crate::pointer::{path_to_pointer, JsonPath, JsonPointer, PathKey};
use crate::refs::{build_ref, parse_ref, ParsedRef};
use crate::resolver::Resolver;
use crate::types::{json_type_name, DereferenceOptions, RefHooks};
use crate::value::{is_container, merge_sibling, merge_values, ref_node, split_ref};

/// Output of [`dereference`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dereferenced {
    /// Circular mode off: cycles are left as local `$ref`s.
    Tree(Value),
    /// Circular mode on: cycles are real edges.
    Graph(Graph),
}

impl Dereferenced {
    pub fn as_tree(&self) -> Option<&Value> {
        match self {
            Dereferenced::Tree(value) => Some(value),
            Dereferenced::Graph(_) => None,
        }
    }

    pub fn into_tree(self) -> Option<Value> {
        match self {
            Dereferenced::Tree(value) => Some(value),
            Dereferenced::Graph(_) => None,
        }
    }

    pub fn graph(&self) -> Option<&Graph> {
        match self {
            Dereferenced::Graph(graph) => Some(graph),
            Dereferenced::Tree(_) => None,
        }
    }

    /// Plain JSON tree.
    ///
    /// # Errors
    ///
    /// Returns `RefError::Circular` for a graph that contains a cycle.
    pub fn to_value(&self) -> Result<Value, RefError> {
        match self {
            Dereferenced::Tree(value) => Ok(value.clone()),
            Dereferenced::Graph(graph) => graph.to_value(),
        }
    }

    /// Plain JSON tree with back-edges written as local `$ref`s.
    pub fn to_value_lossy(&self) -> Value {
        match self {
            Dereferenced::Tree(value) => value.clone(),
            Dereferenced::Graph(graph) => graph.to_value_lossy(),
        }
    }
}

/// Dereference the document at `source` (optionally `file#/pointer`).
///
/// # Errors
///
/// Returns `RefError::SourceUnavailable` if the entry document cannot be
/// fetched, or `RefError::PointerUnavailable` if its pointer is missing.
/// Everything unreachable below the entry node is reported through
/// `on_error` and left as a `$ref`.
pub fn dereference(
    source: &str,
    fetcher: &dyn Fetcher,
    options: &DereferenceOptions,
) -> Result<Dereferenced, RefError> {
    let root = parse_ref(source, "");
    let resolver = Resolver::new(root.file.clone(), fetcher);
    run(root, resolver, options)
}

/// Dereference an in-memory document identified as `source_id`.
///
/// Relative `$ref`s resolve against `source_id`; `$ref`s back into
/// `source_id` itself read `value` without calling the fetcher.
pub fn dereference_value(
    value: &Value,
    source_id: &str,
    fetcher: &dyn Fetcher,
    options: &DereferenceOptions,
) -> Result<Dereferenced, RefError> {
    let root = parse_ref(source_id, "");
    let resolver = Resolver::new(root.file.clone(), fetcher);
    resolver.preload(root.file.clone(), Document::Json(value.clone()));
    run(root, resolver, options)
}

fn run(
    root: ParsedRef,
    resolver: Resolver<'_>,
    options: &DereferenceOptions,
) -> Result<Dereferenced, RefError> {
    debug!(source = %root.normalized, "dereference started");

    let base = resolver.entry(&root.pointer)?;

    let session = Session {
        wanted: Mutex::new(local_refs(&base, &root.file)),
        resolver,
        options,
        root_file: root.file.clone(),
        root_pointer: root.pointer.clone(),
        cache: Mutex::new(HashMap::new()),
        cycles: Mutex::new(CycleMap::new()),
    };

    let state = DerefState {
        frames: Arc::new(vec![RefFrame {
            reference: root.normalized.clone(),
            pointer: JsonPointer::root(),
            has_sibling: false,
        }]),
        base_file: Arc::from(root.file.as_str()),
        replay: false,
    };

    let output = Crawler::<DerefState>::new()
        .hook(&session)
        .parallel(options.parallel_crawl)
        .transform(&base, state)
        .unwrap_or(Value::Null);

    debug!(
        source = %root.normalized,
        files = session.resolver.cached_files(),
        "dereference finished"
    );

    if options.enable_circular {
        let cycles = session.cycles.into_inner();
        Ok(Dereferenced::Graph(Graph::reify(&output, &cycles)))
    } else {
        Ok(Dereferenced::Tree(output))
    }
}

/// One `$ref` on the way from the root to the current node.
#[derive(Debug, Clone)]
struct RefFrame {
    reference: String,
    /// Output location of the `$ref` node.
    pointer: JsonPointer,
    has_sibling: bool,
}

#[derive(Debug, Clone)]
struct DerefState {
    frames: Arc<Vec<RefFrame>>,
    base_file: Arc<str>,
    /// Cached content being walked again for the user hooks only.
    replay: bool,
}

struct Cached {
    value: Value,
    origin: JsonPath,
}

struct Session<'a> {
    resolver: Resolver<'a>,
    options: &'a DereferenceOptions,
    root_file: String,
    root_pointer: JsonPointer,
    /// Finalized nodes by normalized ref.
    cache: Mutex<HashMap<String, Arc<Cached>>>,
    /// Refs into the entry file seen so far; only these locations are
    /// snapshotted on exit.
    wanted: Mutex<HashSet<String>>,
    cycles: Mutex<CycleMap>,
}

impl CrawlHook<DerefState> for Session<'_> {
    fn enter<'h>(
        &'h self,
        value: &Value,
        ctx: &CrawlContext<'_, DerefState>,
    ) -> HookResponse<'h, DerefState> {
        if ctx.state.replay {
            self.hooks().crawl(value, ctx.path);
            return HookResponse::pass().on_exit(self.notify_exit(ctx.path.to_vec()));
        }
        self.visit(value, ctx.path, ctx.state)
    }
}

impl<'a> Session<'a> {
    fn hooks(&self) -> &RefHooks {
        &self.options.hooks
    }

    fn visit<'h>(
        &'h self,
        value: &Value,
        path: &[PathKey],
        state: &DerefState,
    ) -> HookResponse<'h, DerefState> {
        let Some((target, sibling)) = split_ref(value) else {
            self.hooks().crawl(value, path);
            return HookResponse::pass().on_exit(self.snapshot(path.to_vec()));
        };

        let target = match target {
            Ok(target) => target,
            Err(bad) => {
                let message = format!(
                    "invalid $ref at {}: expected string, got {}",
                    path_to_pointer(path).to_fragment(),
                    json_type_name(bad)
                );
                warn!("{}", message);
                self.hooks().error(&message, path);
                self.hooks().crawl(value, path);
                return HookResponse::pass().on_exit(self.snapshot(path.to_vec()));
            }
        };

        let sibling = (!sibling.is_empty() && !self.options.ignore_sibling).then_some(sibling);
        let parsed = parse_ref(target, &state.base_file);
        self.hooks().reference(&parsed.normalized, path);
        if parsed.file == self.root_file {
            self.wanted.lock().insert(parsed.normalized.clone());
        }

        if let Some(ancestor) = find_cycle(&state.frames, &parsed.normalized) {
            return self.cut_cycle(ancestor.pointer.clone(), sibling, path);
        }

        let cached = self.cache.lock().get(&parsed.normalized).cloned();
        if let Some(cached) = cached {
            trace!(reference = %parsed.normalized, "dereference cache hit");
            return self.reuse(cached, sibling, path);
        }

        let resolved = self
            .resolver
            .resolve_pointer(&parsed.pointer, &parsed.file, None);
        let Some(data) = resolved.value else {
            debug!(reference = %parsed.normalized, "cannot resolve $ref");
            self.hooks()
                .error(&format!("Cannot resolve: {}", parsed.normalized), path);
            return HookResponse::replace(ref_node(parsed.normalized, sibling.as_ref()));
        };

        let data = merge_sibling(data, sibling.as_ref());
        let mut frames = Vec::with_capacity(state.frames.len() + 1);
        frames.extend(state.frames.iter().cloned());
        frames.push(RefFrame {
            reference: parsed.normalized.clone(),
            pointer: path_to_pointer(path),
            has_sibling: sibling.is_some(),
        });
        let next = DerefState {
            frames: Arc::new(frames),
            base_file: Arc::from(resolved.file.as_str()),
            replay: false,
        };

        let (value, _, inner_state, exits) = self.visit(&data, path, &next).into_parts();
        let response = HookResponse::replace(value.unwrap_or(data))
            .with_state(inner_state.unwrap_or(next))
            .chain_exits(exits);

        if sibling.is_some() {
            response
        } else {
            response.on_exit(self.remember(parsed.normalized, path.to_vec()))
        }
    }

    fn cut_cycle<'h>(
        &'h self,
        ancestor: JsonPointer,
        sibling: Option<Map<String, Value>>,
        path: &[PathKey],
    ) -> HookResponse<'h, DerefState> {
        self.hooks().cycle(&ancestor.to_string(), path);
        trace!(ancestor = %ancestor, at = %path_to_pointer(path), "circular $ref");

        let value = if self.options.enable_circular {
            self.cycles.lock().add(ancestor, path_to_pointer(path));
            sibling.map(Value::Object).unwrap_or(Value::Null)
        } else {
            ref_node(ancestor.to_fragment(), sibling.as_ref())
        };
        self.hooks().crawl(&value, path);
        HookResponse::replace(value).on_exit(self.notify_exit(path.to_vec()))
    }

    fn reuse<'h>(
        &'h self,
        cached: Arc<Cached>,
        sibling: Option<Map<String, Value>>,
        path: &[PathKey],
    ) -> HookResponse<'h, DerefState> {
        if self.options.enable_circular {
            // alias the finalized node so both places are one node
            self.cycles
                .lock()
                .add(path_to_pointer(&cached.origin), path_to_pointer(path));
            let value = sibling.map(Value::Object).unwrap_or(Value::Null);
            self.hooks().crawl(&value, path);
            return HookResponse::replace(value).on_exit(self.notify_exit(path.to_vec()));
        }

        let merged = merge_sibling(cached.value.clone(), sibling.as_ref());
        self.hooks().crawl(&merged, path);

        if self.options.full_crawl {
            return HookResponse::replace(merged)
                .with_state(DerefState {
                    frames: Arc::new(Vec::new()),
                    base_file: Arc::from(""),
                    replay: true,
                })
                .on_exit(self.snapshot(path.to_vec()));
        }

        // crawl only the sibling content, then lay it over the cached node
        let has_sibling = sibling.is_some();
        HookResponse::replace(sibling.map(Value::Object).unwrap_or(Value::Null))
            .on_exit(self.snapshot(path.to_vec()))
            .on_exit(move |node: &mut Value| {
                *node = if has_sibling && is_container(&cached.value) {
                    merge_values(cached.value.clone(), std::mem::take(node))
                } else {
                    cached.value.clone()
                };
            })
    }

    fn notify_exit<'h>(&'h self, path: JsonPath) -> ExitHook<'h> {
        Box::new(move |node: &mut Value| self.hooks().exit(node, &path))
    }

    /// Exit for ordinary nodes: report, then cache under the node's own
    /// location in the entry file if some `$ref` points there.
    fn snapshot<'h>(&'h self, path: JsonPath) -> ExitHook<'h> {
        Box::new(move |node: &mut Value| {
            self.hooks().exit(node, &path);
            if !is_container(node) {
                return;
            }
            let key = build_ref(
                &self.root_file,
                &self.root_pointer.join(&path_to_pointer(&path)),
            );
            if self.wanted.lock().contains(&key) {
                self.store(key, node, path);
            }
        })
    }

    /// Exit for resolved `$ref`s without sibling content.
    fn remember<'h>(&'h self, normalized: String, path: JsonPath) -> ExitHook<'h> {
        Box::new(move |node: &mut Value| {
            if is_container(node) {
                self.store(normalized, node, path);
            }
        })
    }

    fn store(&self, key: String, node: &Value, origin: JsonPath) {
        let cached = Arc::new(Cached {
            value: node.clone(),
            origin,
        });
        // concurrent branches may race here; either result is complete
        self.cache.lock().insert(key, cached);
    }
}

/// Ancestor frame the target `$ref` would loop back to.
///
/// A frame that carried sibling content only counts when it was reached
/// through the same `$ref` as the current one, so two differently
/// extended uses of one target are not conflated.
fn find_cycle<'f>(frames: &'f [RefFrame], normalized: &str) -> Option<&'f RefFrame> {
    let last = frames.last()?;
    frames.iter().enumerate().find_map(|(i, frame)| {
        if frame.reference != normalized {
            return None;
        }
        let same_entry = i > 0 && frames[i - 1].reference == last.reference;
        (!frame.has_sibling || same_entry).then_some(frame)
    })
}

/// Normalized `$ref`s in `value` that point back into `file`.
fn local_refs(value: &Value, file: &str) -> HashSet<String> {
    let mut refs = HashSet::new();
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(target)) = map.get("$ref") {
                    let parsed = parse_ref(target, file);
                    if parsed.file == file {
                        refs.insert(parsed.normalized);
                    }
                }
                stack.extend(map.values());
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;

    fn no_files(source: &str) -> Result<Document, FetchError> {
        Err(FetchError::FileNotFound {
            path: PathBuf::from(source),
        })
    }

    fn deref(value: Value) -> Value {
        dereference_value(&value, "main.json", &no_files, &DereferenceOptions::new())
            .unwrap()
            .into_tree()
            .unwrap()
    }

    #[test]
    fn find_cycle_plain_frame() {
        let frames = vec![
            RefFrame {
                reference: "a#".into(),
                pointer: JsonPointer::root(),
                has_sibling: false,
            },
            RefFrame {
                reference: "a#/x".into(),
                pointer: JsonPointer::parse("/p"),
                has_sibling: false,
            },
        ];
        assert_eq!(
            find_cycle(&frames, "a#/x").map(|f| f.pointer.to_string()),
            Some("/p".to_string())
        );
        assert!(find_cycle(&frames, "a#/y").is_none());
    }

    #[test]
    fn find_cycle_sibling_frame_needs_same_entry() {
        let frames = vec![
            RefFrame {
                reference: "a#".into(),
                pointer: JsonPointer::root(),
                has_sibling: false,
            },
            RefFrame {
                reference: "a#/x".into(),
                pointer: JsonPointer::parse("/p"),
                has_sibling: true,
            },
            RefFrame {
                reference: "a#/y".into(),
                pointer: JsonPointer::parse("/p/q"),
                has_sibling: false,
            },
        ];
        assert!(find_cycle(&frames, "a#/x").is_none());

        let frames = &frames[..2];
        // last frame is the sibling frame itself; its predecessor differs
        assert!(find_cycle(frames, "a#/x").is_none());
    }

    #[test]
    fn local_refs_collects_entry_file_targets() {
        let value = json!({
            "a": { "$ref": "#/definitions/x" },
            "b": [{ "$ref": "other.json#/y" }, { "$ref": "main.json#/z" }]
        });
        let refs = local_refs(&value, "main.json");
        assert!(refs.contains("main.json#/definitions/x"));
        assert!(refs.contains("main.json#/z"));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn local_ref_is_inlined() {
        let result = deref(json!({
            "definitions": { "id": { "type": "string" } },
            "properties": { "id": { "$ref": "#/definitions/id" } }
        }));
        assert_eq!(result["properties"]["id"], json!({ "type": "string" }));
    }

    #[test]
    fn ref_inside_pointer_selected_root() {
        let value = json!({
            "components": {
                "a": { "properties": { "b": { "$ref": "#/components/b" } } },
                "b": { "type": "integer" }
            }
        });
        let result = dereference_value(
            &value,
            "main.json#/components/a",
            &no_files,
            &DereferenceOptions::new(),
        )
        .unwrap();
        assert_eq!(
            result.into_tree().unwrap(),
            json!({ "properties": { "b": { "type": "integer" } } })
        );
    }

    #[test]
    fn missing_pointer_in_entry_is_error() {
        let result = dereference_value(
            &json!({}),
            "main.json#/nope",
            &no_files,
            &DereferenceOptions::new(),
        );
        assert!(matches!(result, Err(RefError::PointerUnavailable { .. })));

        let result = dereference("absent.json", &no_files, &DereferenceOptions::new());
        assert!(matches!(result, Err(RefError::SourceUnavailable { .. })));
    }

    #[test]
    fn ref_to_root_is_cut() {
        let result = deref(json!({
            "type": "object",
            "properties": { "self": { "$ref": "#" } }
        }));
        assert_eq!(result["properties"]["self"], json!({ "$ref": "#" }));
    }
}
