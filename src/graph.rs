//! Arena representation for dereferenced documents with real cycles.
//!
//! A tree of [`serde_json::Value`] cannot hold a node that contains
//! itself. A [`Graph`] stores every node in one arena and addresses
//! children by [`NodeId`], so a back-reference is simply an edge to an
//! ancestor's id.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::RefError;
use crate::pointer::JsonPointer;

/// Index of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One node of a [`Graph`]. Containers hold ids, not values.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<NodeId>),
    Object(Vec<(String, NodeId)>),
}

/// Placeholders left behind by the dereference pass, grouped by the
/// location they must point back to.
///
/// A placeholder holding `null` becomes a plain alias of its target. A
/// placeholder holding an object (crawled sibling content) becomes a new
/// node that overlays that content on the target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleMap {
    entries: Vec<(JsonPointer, Vec<JsonPointer>)>,
}

impl CycleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `placeholder` must become a reference to `target`.
    pub fn add(&mut self, target: JsonPointer, placeholder: JsonPointer) {
        match self.entries.iter_mut().find(|(t, _)| *t == target) {
            Some((_, placeholders)) => {
                if !placeholders.contains(&placeholder) {
                    placeholders.push(placeholder);
                }
            }
            None => self.entries.push((target, vec![placeholder])),
        }
    }

    /// Placeholders recorded for `target`.
    pub fn get(&self, target: &JsonPointer) -> Option<&[JsonPointer]> {
        self.entries
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, p)| p.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, p)| p.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JsonPointer, &[JsonPointer])> {
        self.entries.iter().map(|(t, p)| (t, p.as_slice()))
    }
}

/// A JSON document whose containers may share children or form cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    root: NodeId,
}

struct Patch {
    parent: NodeId,
    key: String,
    target: NodeId,
    overlay: Option<NodeId>,
}

impl Graph {
    /// Copy a tree into a fresh arena; no sharing yet.
    pub fn from_value(value: &Value) -> Self {
        let mut nodes = Vec::new();
        let root = insert_value(&mut nodes, value);
        Self { nodes, root }
    }

    /// Build a graph from a dereferenced tree and turn every placeholder
    /// in `cycles` into an edge to its target.
    pub fn reify(value: &Value, cycles: &CycleMap) -> Self {
        let mut graph = Self::from_value(value);
        graph.patch(cycles);
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }

    /// Child of a container by key or array index.
    pub fn get(&self, id: NodeId, key: &str) -> Option<NodeId> {
        match self.node(id) {
            GraphNode::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, c)| *c),
            GraphNode::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).copied()),
            _ => None,
        }
    }

    /// Walk a pointer from the root.
    pub fn lookup(&self, pointer: &JsonPointer) -> Option<NodeId> {
        pointer
            .segments()
            .iter()
            .try_fold(self.root, |id, segment| self.get(id, segment))
    }

    /// True when both ids name the same node (not merely equal content).
    pub fn same(&self, a: NodeId, b: NodeId) -> bool {
        a == b
    }

    /// Convert back to a tree. Shared nodes are duplicated.
    ///
    /// # Errors
    ///
    /// Returns `RefError::Circular` if a node is reachable from itself.
    pub fn to_value(&self) -> Result<Value, RefError> {
        let mut on_path = HashSet::new();
        self.write(self.root, &JsonPointer::root(), &mut on_path, &mut None)
    }

    /// Convert back to a tree, writing each back-edge as
    /// `{"$ref": "#<pointer>"}` to where its target was first reached.
    pub fn to_value_lossy(&self) -> Value {
        let mut on_path = HashSet::new();
        let mut first_seen = Some(HashMap::new());
        // lossy mode never errors
        self.write(self.root, &JsonPointer::root(), &mut on_path, &mut first_seen)
            .unwrap_or(Value::Null)
    }

    fn write(
        &self,
        id: NodeId,
        pointer: &JsonPointer,
        on_path: &mut HashSet<NodeId>,
        first_seen: &mut Option<HashMap<NodeId, JsonPointer>>,
    ) -> Result<Value, RefError> {
        if on_path.contains(&id) {
            return match first_seen.as_mut() {
                Some(seen) => {
                    let target = seen.get(&id).cloned().unwrap_or_default();
                    let mut map = Map::new();
                    map.insert("$ref".into(), Value::String(target.to_fragment()));
                    Ok(Value::Object(map))
                }
                None => Err(RefError::Circular {
                    path: pointer.to_string(),
                }),
            };
        }
        if let Some(seen) = first_seen.as_mut() {
            seen.entry(id).or_insert_with(|| pointer.clone());
        }

        let value = match self.node(id) {
            GraphNode::Null => Value::Null,
            GraphNode::Bool(b) => Value::Bool(*b),
            GraphNode::Number(n) => Value::Number(n.clone()),
            GraphNode::String(s) => Value::String(s.clone()),
            GraphNode::Array(items) => {
                on_path.insert(id);
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    let child_pointer = pointer.child(i.to_string());
                    out.push(self.write(*child, &child_pointer, on_path, first_seen)?);
                }
                on_path.remove(&id);
                Value::Array(out)
            }
            GraphNode::Object(entries) => {
                on_path.insert(id);
                let mut out = Map::new();
                for (key, child) in entries {
                    let child_pointer = pointer.child(key.clone());
                    out.insert(
                        key.clone(),
                        self.write(*child, &child_pointer, on_path, first_seen)?,
                    );
                }
                on_path.remove(&id);
                Value::Object(out)
            }
        };
        Ok(value)
    }

    /// Redirect every placeholder slot to its target.
    ///
    /// All targets and slots are located before anything is rewired, so
    /// paths keep their tree meaning. Each slot is patched at most once.
    fn patch(&mut self, cycles: &CycleMap) {
        let mut patches = Vec::new();
        let mut patched = HashSet::new();

        for (target, placeholders) in cycles.iter() {
            let Some(target_id) = self.lookup(target) else {
                debug!(target = %target, "cycle target missing from output");
                continue;
            };
            for placeholder in placeholders {
                let (Some(parent), Some(key)) = (placeholder.parent(), placeholder.last()) else {
                    continue;
                };
                let Some(parent_id) = self.lookup(&parent) else {
                    continue;
                };
                let Some(current) = self.get(parent_id, key) else {
                    continue;
                };
                if !patched.insert((parent_id, key.to_string())) {
                    continue;
                }
                let overlay = match self.node(current) {
                    GraphNode::Object(_) => Some(current),
                    _ => None,
                };
                patches.push(Patch {
                    parent: parent_id,
                    key: key.to_string(),
                    target: target_id,
                    overlay,
                });
            }
        }

        let mut merged = Vec::new();
        for patch in &patches {
            let id = match patch.overlay {
                None => patch.target,
                Some(overlay) => {
                    let id = self.push(GraphNode::Null);
                    merged.push((id, patch.target, overlay));
                    id
                }
            };
            self.set_child(patch.parent, &patch.key, id);
        }

        for (id, target, overlay) in merged {
            let node = self.overlay(target, overlay);
            self.nodes[id.0] = node;
        }
    }

    /// Content of `base` with `patch` merged over it: objects unioned,
    /// arrays concatenated, otherwise `patch` wins.
    fn overlay(&mut self, base: NodeId, patch: NodeId) -> GraphNode {
        match (self.node(base).clone(), self.node(patch).clone()) {
            (GraphNode::Object(mut entries), GraphNode::Object(extra)) => {
                for (key, child) in extra {
                    match entries.iter().position(|(k, _)| *k == key) {
                        Some(i) => {
                            let existing = entries[i].1;
                            let node = self.overlay(existing, child);
                            entries[i].1 = self.push(node);
                        }
                        None => entries.push((key, child)),
                    }
                }
                GraphNode::Object(entries)
            }
            (GraphNode::Array(mut items), GraphNode::Array(extra)) => {
                items.extend(extra);
                GraphNode::Array(items)
            }
            (base @ GraphNode::Array(_), _) => base,
            (_, patch) => patch,
        }
    }

    fn push(&mut self, node: GraphNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn set_child(&mut self, parent: NodeId, key: &str, child: NodeId) {
        match &mut self.nodes[parent.0] {
            GraphNode::Object(entries) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| k == key) {
                    slot.1 = child;
                }
            }
            GraphNode::Array(items) => {
                if let Some(slot) = key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    *slot = child;
                }
            }
            _ => {}
        }
    }
}

fn insert_value(nodes: &mut Vec<GraphNode>, value: &Value) -> NodeId {
    let index = nodes.len();
    nodes.push(GraphNode::Null);
    let node = match value {
        Value::Null => GraphNode::Null,
        Value::Bool(b) => GraphNode::Bool(*b),
        Value::Number(n) => GraphNode::Number(n.clone()),
        Value::String(s) => GraphNode::String(s.clone()),
        Value::Array(items) => {
            GraphNode::Array(items.iter().map(|v| insert_value(nodes, v)).collect())
        }
        Value::Object(map) => GraphNode::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), insert_value(nodes, v)))
                .collect(),
        ),
    };
    nodes[index] = node;
    NodeId(index)
}
