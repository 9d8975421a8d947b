//! Collapse a multi-file document into one self-contained document.
//!
//! References into the entry file become local pointers. References to
//! other files are either hoisted into a definitions area of the entry
//! document (once per target, then linked) or inlined at the call site.
//! Placement follows the [`RefMapRules`] table of the detected format,
//! keyed by where the `$ref` lands in the output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::crawler::{CrawlContext, CrawlHook, Crawler, HookResponse};
use crate::error::RefError;
use crate::loader::{Document, Fetcher};
use crate::pointer::{
    get_by_pointer, get_child, path_to_pointer, set_by_pointer, JsonPath, JsonPointer, PathKey,
};
use crate::refs::{build_ref, filename, parse_ref, ParsedRef};
use crate::resolver::Resolver;
use crate::rules::{JsonType, RefMapRules};
use crate::types::{json_type_name, BundleOptions, RefHooks};
use crate::value::{merge_values, ref_node, split_ref};

/// Bundle the document at `source` (optionally `file#/pointer`).
///
/// # Errors
///
/// Returns `RefError::SourceUnavailable` or `RefError::PointerUnavailable`
/// when the entry node cannot be loaded. Unreachable `$ref`s below it are
/// reported through `on_error` and kept in normalized form.
pub fn bundle(source: &str, fetcher: &dyn Fetcher, options: &BundleOptions) -> Result<Value, RefError> {
    let root = parse_ref(source, "");
    let resolver = Resolver::new(root.file.clone(), fetcher);
    run(root, resolver, options)
}

/// Bundle an in-memory document identified as `source_id`.
pub fn bundle_value(
    value: &Value,
    source_id: &str,
    fetcher: &dyn Fetcher,
    options: &BundleOptions,
) -> Result<Value, RefError> {
    let root = parse_ref(source_id, "");
    let resolver = Resolver::new(root.file.clone(), fetcher);
    resolver.preload(root.file.clone(), Document::Json(value.clone()));
    run(root, resolver, options)
}

fn run(root: ParsedRef, resolver: Resolver<'_>, options: &BundleOptions) -> Result<Value, RefError> {
    let base = resolver.entry(&root.pointer)?;

    let format = JsonType::detect(&base);
    debug!(source = %root.normalized, ?format, "bundle started");

    let session = Session {
        rules: options.rules.clone().unwrap_or_else(|| format.rules()),
        format,
        resolver,
        options,
        root_file: root.file.clone(),
        base,
        defs: Mutex::new(Definitions::default()),
    };

    let state = BundleState {
        base_file: Arc::from(root.file.as_str()),
        prefix: Arc::new(Vec::new()),
        def_prefix: Arc::from(""),
        frames: Arc::new(vec![(root.normalized.clone(), JsonPointer::root())]),
    };

    let output = Crawler::<BundleState>::new()
        .hook(&session)
        .parallel(options.parallel_crawl)
        .transform(&session.base, state)
        .unwrap_or(Value::Null);

    let defs = session.defs.into_inner();
    debug!(
        source = %root.normalized,
        definitions = defs.links.len(),
        files = session.resolver.cached_files(),
        "bundle finished"
    );
    if defs.values.is_null() {
        return Ok(output);
    }
    Ok(merge_values(output, defs.values))
}

#[derive(Debug, Clone)]
struct BundleState {
    /// File the current content was read from.
    base_file: Arc<str>,
    /// Output location of the content being crawled.
    prefix: Arc<JsonPath>,
    /// Name stem for unnamed definitions found below this point.
    def_prefix: Arc<str>,
    /// Inlined refs on the way here and where they were inlined.
    frames: Arc<Vec<(String, JsonPointer)>>,
}

#[derive(Default)]
struct Definitions {
    /// Normalized target to the definition it was hoisted into.
    links: HashMap<String, JsonPointer>,
    /// Synthesized definitions, laid out like the output document.
    values: Value,
    /// Definitions that took over a `$ref`-only entry of the entry document.
    replaced: HashSet<JsonPointer>,
}

enum Claim {
    Linked(JsonPointer),
    New(JsonPointer),
}

struct Session<'a> {
    resolver: Resolver<'a>,
    options: &'a BundleOptions,
    format: JsonType,
    rules: RefMapRules,
    root_file: String,
    base: Value,
    defs: Mutex<Definitions>,
}

impl CrawlHook<BundleState> for Session<'_> {
    fn enter<'h>(
        &'h self,
        value: &Value,
        ctx: &CrawlContext<'_, BundleState>,
    ) -> HookResponse<'h, BundleState> {
        let mut path = ctx.state.prefix.as_ref().clone();
        path.extend(ctx.path.iter().cloned());
        self.hooks().crawl(value, &path);

        let Some((target, sibling)) = split_ref(value) else {
            return HookResponse::pass();
        };
        let target = match target {
            Ok(target) => target,
            Err(bad) => {
                let message = format!(
                    "invalid $ref at {}: expected string, got {}",
                    path_to_pointer(&path).to_fragment(),
                    json_type_name(bad)
                );
                warn!("{}", message);
                self.hooks().error(&message, &path);
                return HookResponse::pass();
            }
        };

        let location = path_to_pointer(&path);
        if !ctx.path.is_empty() && self.defs.lock().replaced.contains(&location) {
            // filled in from the synthesized definitions
            return HookResponse::replace(Value::Null);
        }

        let sibling = if self.options.ignore_sibling {
            Map::new()
        } else {
            sibling
        };
        self.visit(target, sibling, &path, location, ctx.state)
    }
}

impl Session<'_> {
    fn hooks(&self) -> &RefHooks {
        &self.options.hooks
    }

    fn visit<'h>(
        &'h self,
        target: &str,
        sibling: Map<String, Value>,
        path: &[PathKey],
        location: JsonPointer,
        state: &BundleState,
    ) -> HookResponse<'h, BundleState> {
        let parsed = parse_ref(target, &state.base_file);
        self.hooks().reference(&parsed.normalized, path);

        if parsed.file == self.root_file {
            let local = format!("#{}", parsed.raw_pointer);
            return HookResponse::replace(ref_node(local, Some(&sibling)));
        }

        if let Some((_, ancestor)) = state.frames.iter().find(|(r, _)| *r == parsed.normalized) {
            self.hooks().cycle(&ancestor.to_string(), path);
            trace!(ancestor = %ancestor, at = %location, "circular inline $ref");
            return HookResponse::replace(ref_node(ancestor.to_fragment(), Some(&sibling)));
        }

        if let Some(link) = self.linked(&parsed) {
            trace!(reference = %parsed.normalized, link = %link, "reusing definition");
            return HookResponse::replace(ref_node(link.to_fragment(), Some(&sibling)));
        }

        let resolved = self
            .resolver
            .resolve_pointer(&parsed.pointer, &parsed.file, None);
        let Some(data) = resolved.value else {
            debug!(reference = %parsed.normalized, "cannot resolve $ref");
            self.hooks()
                .error(&format!("Cannot resolve: {}", parsed.normalized), path);
            return HookResponse::replace(ref_node(parsed.normalized, Some(&sibling)));
        };

        if data.is_string() {
            // text document
            return HookResponse::replace(data);
        }

        let area = if location.is_root() {
            None
        } else {
            match self.rules.lookup(&location) {
                Some(rules) => rules.definitions_pointer(),
                None => self.format.fallback_area(&parsed.pointer, &data),
            }
        };

        match area {
            Some(area) => self.hoist(&parsed, data, &resolved.file, &area, sibling, &location, state),
            None => self.inline(&parsed, data, &resolved.file, sibling, &location, state),
        }
    }

    /// Definition already recorded for `parsed`, directly or below a
    /// whole-file definition of the same file.
    fn linked(&self, parsed: &ParsedRef) -> Option<JsonPointer> {
        let defs = self.defs.lock();
        if let Some(link) = defs.links.get(&parsed.normalized) {
            return Some(link.clone());
        }
        let first = parsed.pointer.segments().first()?;
        if first == "definitions" || first == "$defs" {
            // stripped from copied definitions
            return None;
        }
        let whole = defs.links.get(&build_ref(&parsed.file, &JsonPointer::root()))?;
        Some(whole.join(&parsed.pointer))
    }

    #[allow(clippy::too_many_arguments)]
    fn hoist<'h>(
        &'h self,
        parsed: &ParsedRef,
        mut data: Value,
        file: &str,
        area: &JsonPointer,
        sibling: Map<String, Value>,
        location: &JsonPointer,
        state: &BundleState,
    ) -> HookResponse<'h, BundleState> {
        if let Value::Object(map) = &mut data {
            map.remove("$defs");
            map.remove("definitions");
        }

        let name = definition_name(&data, parsed, &state.def_prefix);
        let pointer = match self.claim(area, &name, &parsed.normalized) {
            Claim::Linked(link) => {
                return HookResponse::replace(ref_node(link.to_fragment(), Some(&sibling)));
            }
            Claim::New(pointer) => pointer,
        };
        debug!(reference = %parsed.normalized, definition = %pointer, "hoisting definition");

        let nested = BundleState {
            base_file: Arc::from(file),
            prefix: Arc::new(pointer_to_path(&pointer)),
            def_prefix: Arc::from(format!("{}-", pointer.last().unwrap_or(name.as_str()))),
            frames: state.frames.clone(),
        };
        let content = Crawler::<BundleState>::new()
            .hook(self)
            .parallel(self.options.parallel_crawl)
            .transform(&data, nested)
            .unwrap_or(Value::Null);

        let mut defs = self.defs.lock();
        set_by_pointer(&mut defs.values, &pointer, content);
        if pointer == *location {
            // the `$ref` node itself was the entry being replaced
            return HookResponse::replace(Value::Null);
        }
        drop(defs);
        HookResponse::replace(ref_node(pointer.to_fragment(), Some(&sibling)))
    }

    /// Reserve a definition slot for `normalized` under `area`.
    ///
    /// Names already taken get numeric suffixes (`User`, `User1`, ...). An
    /// entry of the entry document that is only a `$ref` to the same target
    /// is taken over instead.
    fn claim(&self, area: &JsonPointer, name: &str, normalized: &str) -> Claim {
        let mut defs = self.defs.lock();
        if let Some(link) = defs.links.get(normalized) {
            return Claim::Linked(link.clone());
        }

        let existing = get_by_pointer(&self.base, area);
        let mut index = 0usize;
        let pointer = loop {
            let candidate = match index {
                0 => name.to_string(),
                i => format!("{}{}", name, i),
            };
            index += 1;
            let pointer = area.child(candidate.as_str());
            if get_by_pointer(&defs.values, &pointer).is_some() {
                continue;
            }
            match existing.and_then(|area| get_child(area, &candidate)) {
                None => break pointer,
                Some(entry) if self.links_to(entry, normalized) => {
                    defs.replaced.insert(pointer.clone());
                    break pointer;
                }
                Some(_) => {}
            }
        };

        defs.links.insert(normalized.to_string(), pointer.clone());
        if defs.values.is_null() {
            defs.values = Value::Object(Map::new());
        }
        set_by_pointer(&mut defs.values, &pointer, Value::Null);
        Claim::New(pointer)
    }

    /// True for a `$ref`-only object pointing at `normalized`.
    fn links_to(&self, entry: &Value, normalized: &str) -> bool {
        match split_ref(entry) {
            Some((Ok(target), rest)) if rest.is_empty() => {
                parse_ref(target, &self.root_file).normalized == normalized
            }
            _ => false,
        }
    }

    fn inline<'h>(
        &'h self,
        parsed: &ParsedRef,
        data: Value,
        file: &str,
        sibling: Map<String, Value>,
        location: &JsonPointer,
        state: &BundleState,
    ) -> HookResponse<'h, BundleState> {
        trace!(reference = %parsed.normalized, at = %location, "inlining $ref");
        let mut frames = Vec::with_capacity(state.frames.len() + 1);
        frames.extend(state.frames.iter().cloned());
        frames.push((parsed.normalized.clone(), location.clone()));

        let nested = BundleState {
            base_file: Arc::from(file),
            prefix: Arc::new(pointer_to_path(location)),
            def_prefix: state.def_prefix.clone(),
            frames: Arc::new(frames),
        };
        let content = Crawler::<BundleState>::new()
            .hook(self)
            .parallel(self.options.parallel_crawl)
            .transform(&data, nested)
            .unwrap_or(Value::Null);

        // the sibling content is crawled in place, then laid over the target
        HookResponse::replace(Value::Object(sibling)).on_exit(move |node: &mut Value| {
            let crawled = std::mem::take(node);
            *node = match crawled {
                Value::Object(map) if map.is_empty() => content,
                crawled if content.is_object() => merge_values(content, crawled),
                _ => content,
            };
        })
    }
}

fn definition_name(data: &Value, parsed: &ParsedRef, def_prefix: &str) -> String {
    let explicit = ["$id", "id"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .filter(|id| !id.is_empty());
    let name = match explicit {
        Some(id) => id.to_string(),
        None => match parsed.pointer.last() {
            Some(tail) => filename(tail),
            None => filename(&parsed.file),
        },
    };
    if name.is_empty() {
        format!("{}definition", def_prefix)
    } else {
        name
    }
}

fn pointer_to_path(pointer: &JsonPointer) -> JsonPath {
    pointer
        .segments()
        .iter()
        .map(|segment| PathKey::Key(segment.clone()))
        .collect()
}
