//! Options and callback hooks for dereference and bundle calls.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::pointer::PathKey;
use crate::rules::RefMapRules;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Callback receiving a message or ref string and the output path.
pub type RefCallback = Arc<dyn Fn(&str, &[PathKey]) + Send + Sync>;

/// Callback receiving a node and its output path.
pub type NodeCallback = Arc<dyn Fn(&Value, &[PathKey]) + Send + Sync>;

/// Observer callbacks fired during a resolution session.
///
/// With parallel crawling enabled, callbacks from different branches may
/// interleave.
#[derive(Clone, Default)]
pub struct RefHooks {
    /// Unresolvable source or pointer, or a malformed `$ref`.
    pub on_error: Option<RefCallback>,
    /// Every `$ref` encountered, normalized.
    pub on_ref: Option<RefCallback>,
    /// Every node entered.
    pub on_crawl: Option<NodeCallback>,
    /// Every node finalized (dereference only).
    pub on_exit: Option<NodeCallback>,
    /// A `$ref` cut as circular; receives the ancestor pointer.
    pub on_cycle: Option<RefCallback>,
}

impl RefHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, f: impl Fn(&str, &[PathKey]) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_ref(mut self, f: impl Fn(&str, &[PathKey]) + Send + Sync + 'static) -> Self {
        self.on_ref = Some(Arc::new(f));
        self
    }

    pub fn on_crawl(mut self, f: impl Fn(&Value, &[PathKey]) + Send + Sync + 'static) -> Self {
        self.on_crawl = Some(Arc::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl Fn(&Value, &[PathKey]) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Arc::new(f));
        self
    }

    pub fn on_cycle(mut self, f: impl Fn(&str, &[PathKey]) + Send + Sync + 'static) -> Self {
        self.on_cycle = Some(Arc::new(f));
        self
    }

    pub(crate) fn error(&self, message: &str, path: &[PathKey]) {
        if let Some(f) = &self.on_error {
            f(message, path);
        }
    }

    pub(crate) fn reference(&self, normalized: &str, path: &[PathKey]) {
        if let Some(f) = &self.on_ref {
            f(normalized, path);
        }
    }

    pub(crate) fn crawl(&self, value: &Value, path: &[PathKey]) {
        if let Some(f) = &self.on_crawl {
            f(value, path);
        }
    }

    pub(crate) fn exit(&self, value: &Value, path: &[PathKey]) {
        if let Some(f) = &self.on_exit {
            f(value, path);
        }
    }

    pub(crate) fn cycle(&self, pointer: &str, path: &[PathKey]) {
        if let Some(f) = &self.on_cycle {
            f(pointer, path);
        }
    }
}

impl fmt::Debug for RefHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefHooks")
            .field("on_error", &self.on_error.is_some())
            .field("on_ref", &self.on_ref.is_some())
            .field("on_crawl", &self.on_crawl.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .field("on_cycle", &self.on_cycle.is_some())
            .finish()
    }
}

/// Options for [`dereference`](crate::dereference).
#[derive(Debug, Clone, Default)]
pub struct DereferenceOptions {
    /// Drop content next to `$ref` instead of merging it.
    pub ignore_sibling: bool,
    /// Walk cached content again so hooks see every node.
    pub full_crawl: bool,
    /// Turn circular `$ref`s into real back-references (graph output).
    pub enable_circular: bool,
    /// Explore sibling subtrees concurrently.
    pub parallel_crawl: bool,
    pub hooks: RefHooks,
}

impl DereferenceOptions {
    /// All flags off, no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_sibling(mut self, ignore_sibling: bool) -> Self {
        self.ignore_sibling = ignore_sibling;
        self
    }

    pub fn full_crawl(mut self, full_crawl: bool) -> Self {
        self.full_crawl = full_crawl;
        self
    }

    pub fn enable_circular(mut self, enable_circular: bool) -> Self {
        self.enable_circular = enable_circular;
        self
    }

    /// Global hook order is only stable when this is off.
    pub fn parallel_crawl(mut self, parallel_crawl: bool) -> Self {
        self.parallel_crawl = parallel_crawl;
        self
    }

    pub fn hooks(mut self, hooks: RefHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// Options for [`bundle`](crate::bundle).
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    /// Drop content next to `$ref` instead of keeping it.
    pub ignore_sibling: bool,
    /// Explore sibling subtrees concurrently.
    pub parallel_crawl: bool,
    pub hooks: RefHooks,
    /// Replaces the placement table picked from the document format.
    pub rules: Option<RefMapRules>,
}

impl BundleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_sibling(mut self, ignore_sibling: bool) -> Self {
        self.ignore_sibling = ignore_sibling;
        self
    }

    pub fn parallel_crawl(mut self, parallel_crawl: bool) -> Self {
        self.parallel_crawl = parallel_crawl;
        self
    }

    pub fn hooks(mut self, hooks: RefHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn rules(mut self, rules: RefMapRules) -> Self {
        self.rules = Some(rules);
        self
    }
}
