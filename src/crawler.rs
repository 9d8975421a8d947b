//! Generic traversal/clone engine.
//!
//! A [`Crawler`] walks a value in pre-order (object keys in enumeration
//! order, array indices ascending) and builds an output tree. At each node
//! an ordered pipeline of [`CrawlHook`]s may replace the value, prune the
//! subtree, override the per-branch state, or register exit callbacks that
//! run once every descendant is finished (child before parent, LIFO within
//! a node).
//!
//! Sequential mode uses an explicit work stack, so deep documents never
//! grow the call stack. Parallel mode fans sibling subtrees out on rayon
//! and reassembles them in source order; the output is identical, only the
//! interleaving of hook calls across branches differs. Fan-out stops at a
//! fixed nesting depth and deeper subtrees run on the work stack.

use std::borrow::Cow;

use rayon::prelude::*;
use serde_json::{Map, Value};

use crate::pointer::{JsonPath, PathKey};

/// Callback run with the finalized output value of a node.
pub type ExitHook<'h> = Box<dyn FnOnce(&mut Value) + Send + 'h>;

/// What a hook sees at a node.
#[derive(Debug)]
pub struct CrawlContext<'a, S> {
    /// Path from the traversal root to this node.
    pub path: &'a [PathKey],
    /// Key of this node in its parent, `None` at the root.
    pub key: Option<&'a PathKey>,
    /// Branch state inherited from the parent (or set by an earlier hook).
    pub state: &'a S,
}

/// A hook's decision for one node.
pub struct HookResponse<'h, S> {
    value: Option<Value>,
    prune: bool,
    state: Option<S>,
    exits: Vec<ExitHook<'h>>,
}

impl<'h, S> HookResponse<'h, S> {
    /// Keep the value as it is.
    pub fn pass() -> Self {
        Self {
            value: None,
            prune: false,
            state: None,
            exits: Vec::new(),
        }
    }

    /// Substitute `value` for output and further recursion.
    pub fn replace(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::pass()
        }
    }

    /// Drop the subtree: no recursion, nothing written to the output.
    pub fn prune() -> Self {
        Self {
            prune: true,
            ..Self::pass()
        }
    }

    /// State handed to this node's descendants.
    pub fn with_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// Register a callback run after all descendants are finished.
    pub fn on_exit(mut self, exit: impl FnOnce(&mut Value) + Send + 'h) -> Self {
        self.exits.push(Box::new(exit));
        self
    }

    /// Append exits from another response, keeping their order.
    pub fn chain_exits(mut self, exits: Vec<ExitHook<'h>>) -> Self {
        self.exits.extend(exits);
        self
    }

    pub fn is_pruned(&self) -> bool {
        self.prune
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    /// Split into parts, for hooks that wrap other hooks.
    pub fn into_parts(self) -> (Option<Value>, bool, Option<S>, Vec<ExitHook<'h>>) {
        (self.value, self.prune, self.state, self.exits)
    }
}

/// One stage of the per-node pipeline.
pub trait CrawlHook<S>: Sync {
    fn enter<'h>(&'h self, value: &Value, ctx: &CrawlContext<'_, S>) -> HookResponse<'h, S>;
}

impl<S, F> CrawlHook<S> for F
where
    F: Fn(&Value, &CrawlContext<'_, S>) -> HookResponse<'static, S> + Sync,
{
    fn enter<'h>(&'h self, value: &Value, ctx: &CrawlContext<'_, S>) -> HookResponse<'h, S> {
        self(value, ctx)
    }
}

/// Drives a hook pipeline over a value.
pub struct Crawler<'h, S> {
    hooks: Vec<&'h dyn CrawlHook<S>>,
    parallel: bool,
}

/// Nesting depth below which parallel mode still fans out; deeper subtrees
/// are finished on the sequential work stack.
const PARALLEL_DEPTH: usize = 64;

enum Entered<'v, 'h, S> {
    Pruned,
    Leaf(Value),
    Branch(Frame<'v, 'h, S>),
}

struct Frame<'v, 'h, S> {
    /// Key in the parent output, `None` for the walk's root.
    key: Option<PathKey>,
    state: S,
    output: Value,
    children: std::vec::IntoIter<(PathKey, Cow<'v, Value>)>,
    exits: Vec<ExitHook<'h>>,
}

impl<'h, S> Crawler<'h, S>
where
    S: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            parallel: false,
        }
    }

    /// Append a hook to the pipeline.
    pub fn hook(mut self, hook: &'h dyn CrawlHook<S>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Explore sibling subtrees concurrently.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Walk `source` and build the output tree.
    ///
    /// Returns `None` when the root itself is pruned.
    pub fn transform(&self, source: &Value, state: S) -> Option<Value> {
        if self.parallel {
            self.crawl_parallel(Cow::Borrowed(source), Vec::new(), state)
        } else {
            self.crawl_sequential(Cow::Borrowed(source), Vec::new(), state)
        }
    }

    /// Work-stack walk; `path` is shared by all frames and grows and
    /// shrinks with the stack.
    fn crawl_sequential<'v>(&self, source: Cow<'v, Value>, path: JsonPath, state: S) -> Option<Value> {
        let mut path = path;
        let mut stack: Vec<Frame<'v, 'h, S>> = match self.enter_node(source, &path, None, state) {
            Entered::Pruned => return None,
            Entered::Leaf(value) => return Some(value),
            Entered::Branch(frame) => vec![frame],
        };

        while let Some(top) = stack.last_mut() {
            if let Some((key, child)) = top.children.next() {
                path.push(key.clone());
                let state = top.state.clone();
                match self.enter_node(child, &path, Some(key.clone()), state) {
                    Entered::Pruned => {
                        path.pop();
                    }
                    Entered::Leaf(value) => {
                        path.pop();
                        insert_child(&mut top.output, key, value);
                    }
                    Entered::Branch(frame) => stack.push(frame),
                }
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let value = finish(frame.output, frame.exits);
            match (stack.last_mut(), frame.key) {
                (Some(parent), Some(key)) => {
                    path.pop();
                    insert_child(&mut parent.output, key, value);
                }
                _ => return Some(value),
            }
        }
        None
    }

    /// Rayon fan-out over siblings. Recurses on the call stack down to
    /// `PARALLEL_DEPTH`, then hands each subtree to the work stack.
    fn crawl_parallel<'v>(&self, source: Cow<'v, Value>, path: JsonPath, state: S) -> Option<Value> {
        if path.len() >= PARALLEL_DEPTH {
            return self.crawl_sequential(source, path, state);
        }
        let key = path.last().cloned();
        let frame = match self.enter_node(source, &path, key, state) {
            Entered::Pruned => return None,
            Entered::Leaf(value) => return Some(value),
            Entered::Branch(frame) => frame,
        };

        let Frame {
            state,
            mut output,
            children,
            exits,
            ..
        } = frame;

        let children: Vec<_> = children.collect();
        let results: Vec<(PathKey, Option<Value>)> = children
            .into_par_iter()
            .map(|(key, child)| {
                let mut child_path = path.clone();
                child_path.push(key.clone());
                let value = self.crawl_parallel(child, child_path, state.clone());
                (key, value)
            })
            .collect();

        for (key, value) in results {
            if let Some(value) = value {
                insert_child(&mut output, key, value);
            }
        }
        Some(finish(output, exits))
    }

    /// Run the hook pipeline for one node.
    fn enter_node<'v>(
        &self,
        source: Cow<'v, Value>,
        path: &[PathKey],
        key: Option<PathKey>,
        state: S,
    ) -> Entered<'v, 'h, S> {
        let mut current = source;
        let mut state = state;
        let mut exits: Vec<ExitHook<'h>> = Vec::new();

        for &hook in &self.hooks {
            let ctx = CrawlContext {
                path,
                key: path.last(),
                state: &state,
            };
            let (value, prune, next_state, hook_exits) = hook.enter(&current, &ctx).into_parts();
            if prune {
                return Entered::Pruned;
            }
            exits.extend(hook_exits);
            if let Some(value) = value {
                current = Cow::Owned(value);
            }
            if let Some(next_state) = next_state {
                state = next_state;
            }
        }

        match split_children(current) {
            Ok((output, children)) => Entered::Branch(Frame {
                key,
                state,
                output,
                children: children.into_iter(),
                exits,
            }),
            Err(leaf) => Entered::Leaf(finish(leaf, exits)),
        }
    }
}

impl<'h, S> Default for Crawler<'h, S>
where
    S: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

type Children<'v> = Vec<(PathKey, Cow<'v, Value>)>;

/// Empty output container plus the children to visit, or the leaf value.
fn split_children(value: Cow<'_, Value>) -> Result<(Value, Children<'_>), Value> {
    match value {
        Cow::Borrowed(Value::Object(map)) => Ok((
            Value::Object(Map::new()),
            map.iter()
                .map(|(k, v)| (PathKey::Key(k.clone()), Cow::Borrowed(v)))
                .collect(),
        )),
        Cow::Borrowed(Value::Array(arr)) => Ok((
            Value::Array(Vec::with_capacity(arr.len())),
            arr.iter()
                .enumerate()
                .map(|(i, v)| (PathKey::Index(i), Cow::Borrowed(v)))
                .collect(),
        )),
        Cow::Owned(Value::Object(map)) => Ok((
            Value::Object(Map::new()),
            map.into_iter()
                .map(|(k, v)| (PathKey::Key(k), Cow::Owned(v)))
                .collect(),
        )),
        Cow::Owned(Value::Array(arr)) => Ok((
            Value::Array(Vec::with_capacity(arr.len())),
            arr.into_iter()
                .enumerate()
                .map(|(i, v)| (PathKey::Index(i), Cow::Owned(v)))
                .collect(),
        )),
        other => Err(other.into_owned()),
    }
}

fn insert_child(output: &mut Value, key: PathKey, value: Value) {
    match output {
        Value::Object(map) => {
            map.insert(key.as_segment(), value);
        }
        // pruned elements are omitted, so push rather than index
        Value::Array(arr) => arr.push(value),
        _ => {}
    }
}

/// Run exit callbacks newest-first on the finished value.
fn finish(mut value: Value, exits: Vec<ExitHook<'_>>) -> Value {
    for exit in exits.into_iter().rev() {
        exit(&mut value);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::path_to_pointer;
    use parking_lot::Mutex;
    use serde_json::json;

    fn pointer_of(ctx: &CrawlContext<'_, ()>) -> String {
        path_to_pointer(ctx.path).to_string()
    }

    #[test]
    fn transform_without_hooks_clones() {
        let source = json!({ "a": [1, { "b": null }], "c": "x" });
        let crawler: Crawler<'_, ()> = Crawler::new();
        assert_eq!(crawler.transform(&source, ()), Some(source.clone()));
    }

    #[test]
    fn visits_in_pre_order() {
        let source = json!({ "b": { "x": 1 }, "a": [true, false] });
        struct Recorder<'a>(&'a Mutex<Vec<String>>);
        impl CrawlHook<()> for Recorder<'_> {
            fn enter<'h>(&'h self, _: &Value, ctx: &CrawlContext<'_, ()>) -> HookResponse<'h, ()> {
                self.0.lock().push(pointer_of(ctx));
                HookResponse::pass()
            }
        }
        let seen = Mutex::new(Vec::new());
        let recorder = Recorder(&seen);
        Crawler::<()>::new().hook(&recorder).transform(&source, ());

        assert_eq!(
            *seen.lock(),
            vec!["", "/b", "/b/x", "/a", "/a/0", "/a/1"]
        );
    }

    #[test]
    fn replace_and_prune() {
        let source = json!({ "keep": { "secret": 1 }, "drop": { "x": 1 }, "list": [1, 2, 3] });
        let hook = |_: &Value, ctx: &CrawlContext<'_, ()>| match ctx.key {
            Some(PathKey::Key(k)) if k == "drop" => HookResponse::prune(),
            Some(PathKey::Key(k)) if k == "secret" => HookResponse::replace(json!("***")),
            Some(PathKey::Index(1)) => HookResponse::prune(),
            Some(PathKey::Index(2)) => HookResponse::replace(json!({ "n": 3 })),
            _ => HookResponse::pass(),
        };
        let result = Crawler::<()>::new().hook(&hook).transform(&source, ());
        assert_eq!(
            result,
            Some(json!({ "keep": { "secret": "***" }, "list": [1, { "n": 3 }] }))
        );
    }

    #[test]
    fn pruned_root_yields_none() {
        let hook = |_: &Value, _: &CrawlContext<'_, ()>| HookResponse::prune();
        assert_eq!(Crawler::<()>::new().hook(&hook).transform(&json!({}), ()), None);
    }

    #[test]
    fn replacement_is_recursed() {
        let source = json!({ "a": "expand" });
        let hook = |value: &Value, _: &CrawlContext<'_, ()>| match value.as_str() {
            Some("expand") => HookResponse::replace(json!({ "inner": "expand-leaf" })),
            Some("expand-leaf") => HookResponse::replace(json!(42)),
            _ => HookResponse::pass(),
        };
        let result = Crawler::<()>::new().hook(&hook).transform(&source, ());
        assert_eq!(result, Some(json!({ "a": { "inner": 42 } })));
    }

    #[test]
    fn state_flows_to_descendants_only() {
        let source = json!({ "a": { "x": 0 }, "b": { "x": 0 } });
        let hook = |value: &Value, ctx: &CrawlContext<'_, u32>| {
            if ctx.key == Some(&PathKey::from("a")) {
                return HookResponse::pass().with_state(ctx.state + 10);
            }
            if value.is_number() {
                return HookResponse::replace(json!(*ctx.state));
            }
            HookResponse::pass()
        };
        let result = Crawler::<u32>::new().hook(&hook).transform(&source, 1);
        assert_eq!(result, Some(json!({ "a": { "x": 11 }, "b": { "x": 1 } })));
    }

    #[test]
    fn exits_run_child_before_parent() {
        struct Order<'a>(&'a Mutex<Vec<String>>);
        impl CrawlHook<()> for Order<'_> {
            fn enter<'h>(&'h self, _: &Value, ctx: &CrawlContext<'_, ()>) -> HookResponse<'h, ()> {
                let name = pointer_of(ctx);
                let first = format!("{}#1", name);
                let second = format!("{}#2", name);
                HookResponse::pass()
                    .on_exit(move |_| self.0.lock().push(first))
                    .on_exit(move |_| self.0.lock().push(second))
            }
        }

        let log = Mutex::new(Vec::new());
        let order = Order(&log);
        let source = json!({ "a": { "b": 1 }, "c": 2 });
        Crawler::<()>::new().hook(&order).transform(&source, ());

        assert_eq!(
            *log.lock(),
            vec!["/a/b#2", "/a/b#1", "/a#2", "/a#1", "/c#2", "/c#1", "#2", "#1"]
        );
    }

    #[test]
    fn exit_can_rewrite_finished_value() {
        let source = json!({ "n": { "a": 1 } });
        let hook = |_: &Value, ctx: &CrawlContext<'_, ()>| {
            if ctx.key == Some(&PathKey::from("n")) {
                HookResponse::pass().on_exit(|value: &mut Value| {
                    value["seen"] = json!(true);
                })
            } else {
                HookResponse::pass()
            }
        };
        let result = Crawler::<()>::new().hook(&hook).transform(&source, ());
        assert_eq!(result, Some(json!({ "n": { "a": 1, "seen": true } })));
    }

    #[test]
    fn later_hooks_see_replacement_and_prune_stops_chain() {
        let first = |value: &Value, _: &CrawlContext<'_, ()>| match value.as_str() {
            Some("a") => HookResponse::replace(json!("b")),
            Some("gone") => HookResponse::prune(),
            _ => HookResponse::pass(),
        };
        let second = |value: &Value, _: &CrawlContext<'_, ()>| match value.as_str() {
            Some("b") => HookResponse::replace(json!("c")),
            Some("gone") => HookResponse::replace(json!("revived")),
            _ => HookResponse::pass(),
        };
        let source = json!(["a", "gone"]);
        let result = Crawler::<()>::new().hook(&first).hook(&second).transform(&source, ());
        assert_eq!(result, Some(json!(["c"])));
    }

    #[test]
    fn parallel_matches_sequential() {
        let source = json!({
            "a": [{ "x": 1 }, { "y": [2, 3] }],
            "b": { "c": { "d": "e" } },
            "f": 5
        });
        let hook = |value: &Value, _: &CrawlContext<'_, ()>| match value {
            Value::Number(n) => HookResponse::replace(json!(n.as_i64().unwrap_or(0) * 2)),
            Value::String(_) => HookResponse::prune(),
            _ => HookResponse::pass().on_exit(|v: &mut Value| {
                if let Value::Object(map) = v {
                    map.insert("done".into(), json!(true));
                }
            }),
        };
        let sequential = Crawler::<()>::new().hook(&hook).transform(&source, ());
        let parallel = Crawler::<()>::new().hook(&hook).parallel(true).transform(&source, ());
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.unwrap()["a"][1]["y"], json!([4, 6]));
    }

    fn deep_chain(depth: usize) -> Value {
        let mut source = json!(0);
        for _ in 0..depth {
            let mut map = Map::new();
            map.insert("n".to_string(), source);
            source = Value::Object(map);
        }
        source
    }

    fn chain_depth(value: &Value) -> usize {
        let mut depth = 0;
        let mut node = value;
        while let Some(next) = node.get("n") {
            node = next;
            depth += 1;
        }
        depth
    }

    #[test]
    fn deep_documents_do_not_overflow() {
        let source = deep_chain(20_000);
        let crawler: Crawler<'_, ()> = Crawler::new();
        let result = crawler.transform(&source, ()).unwrap();
        assert_eq!(chain_depth(&result), 20_000);
        // serde_json drops nested values recursively; leak to keep the test stack-safe
        std::mem::forget(result);
        std::mem::forget(source);
    }

    #[test]
    fn deep_documents_in_parallel_mode() {
        let source = deep_chain(20_000);
        let hook = |_: &Value, ctx: &CrawlContext<'_, ()>| {
            if ctx.path.len() == 20_000 {
                return HookResponse::replace(json!("bottom"));
            }
            HookResponse::pass()
        };
        let result = Crawler::<()>::new()
            .hook(&hook)
            .parallel(true)
            .transform(&source, ())
            .unwrap();

        assert_eq!(chain_depth(&result), 20_000);
        let mut node = &result;
        while let Some(next) = node.get("n") {
            node = next;
        }
        assert_eq!(node, &json!("bottom"));
        std::mem::forget(result);
        std::mem::forget(source);
    }
}
