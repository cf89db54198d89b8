//! State node tree - path-addressed session state
//!
//! A session owns one [`StateTree`]: a strict tree of [`StateNode`]
//! instances, each constructed from its registered node type. Nodes hold
//! their base field values, the baseline of what the client last saw, and
//! a cache for computed fields. Lookup is by dotted [`NodePath`]; a
//! declared child is materialized the first time its path is addressed.
//!
//! Writes go through [`StateTree::write`], which maintains the dirty set
//! against the baseline and propagates dirtiness along the registry's
//! dependency edges - to computed fields on the written node and on any
//! descendant whose type reads the written field from an ancestor. This
//! propagation is the safety-critical invariant of the engine: a missed
//! edge means a cached value that never refreshes.
//!
//! Handler steps run inside a journal (`begin_step` / `commit_step` /
//! `abort_step`). The journal records prior values, cache entries, dirty
//! sets, and created nodes on first touch, so a failing step unwinds
//! completely while a successful one costs only the bookkeeping.

use crate::dirty::DirtyTracker;
use crate::error::{Error, Result};
use crate::path::{FieldRef, NodePath, NodeType, ROOT_SEGMENT};
use crate::registry::Registry;
use crate::value::{Value, ValueMap};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// One addressable unit of state in a session tree
#[derive(Debug, Clone)]
pub struct StateNode {
    pub(crate) path: NodePath,
    pub(crate) node_type: NodeType,
    pub(crate) values: ValueMap,
    pub(crate) baseline: ValueMap,
    pub(crate) computed_cache: ValueMap,
    pub(crate) children: IndexMap<String, StateNode>,
}

impl StateNode {
    /// Build a node from its type's declarations, seeded with defaults
    pub(crate) fn from_spec(path: NodePath, node_type: NodeType, registry: &Registry) -> Self {
        let mut values = ValueMap::new();
        if let Ok(spec) = registry.node(&node_type) {
            for field in spec.fields() {
                values.insert(field.name.clone(), field.default.clone());
            }
        }
        Self {
            path,
            node_type,
            baseline: values.clone(),
            values,
            computed_cache: ValueMap::new(),
            children: IndexMap::new(),
        }
    }

    /// The node's path in the tree
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The node's registered type
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// Current value of a base field, if declared
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// A materialized child by name
    pub fn child(&self, name: &str) -> Option<&StateNode> {
        self.children.get(name)
    }

    /// Iterate materialized children in creation order
    pub fn children(&self) -> impl Iterator<Item = &StateNode> {
        self.children.values()
    }
}

/// Read access for compute functions: own fields plus ancestor fields
///
/// A compute function receives a scope anchored at its node. Reads of
/// other computed fields recurse through the dependency graph (which the
/// registry guarantees is acyclic), honoring caches that are still clean.
pub struct ComputeScope<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) dirty: &'a DirtyTracker,
    /// `chain[0]` is the owning node, followed by its ancestors up to root
    pub(crate) chain: &'a [&'a StateNode],
    /// Values staged for `chain[0]` during a flush pass
    pub(crate) overlay: Option<&'a ValueMap>,
}

impl ComputeScope<'_> {
    /// Read a field on the owning node
    pub fn get(&self, field: &str) -> Result<Value> {
        value_on(self.registry, self.dirty, self.chain, field, self.overlay)
    }

    /// Read a field on the nearest ancestor of the given type
    pub fn ancestor(&self, node_type: impl Into<NodeType>, field: &str) -> Result<Value> {
        let node_type = node_type.into();
        for idx in 1..self.chain.len() {
            if self.chain[idx].node_type == node_type {
                return value_on(self.registry, self.dirty, &self.chain[idx..], field, None);
            }
        }
        Err(Error::NotFound(format!(
            "no ancestor of type {} above {}",
            node_type, self.chain[0].path
        )))
    }

    /// Read an integer field on the owning node
    pub fn get_int(&self, field: &str) -> Result<i64> {
        let value = self.get(field)?;
        value.as_int().ok_or_else(|| Error::TypeError {
            expected: "int".to_string(),
            got: value.type_name().to_string(),
        })
    }

    /// Read a float field on the owning node (integers widen)
    pub fn get_float(&self, field: &str) -> Result<f64> {
        let value = self.get(field)?;
        value.as_float().ok_or_else(|| Error::TypeError {
            expected: "float".to_string(),
            got: value.type_name().to_string(),
        })
    }

    /// Read a boolean field on the owning node
    pub fn get_bool(&self, field: &str) -> Result<bool> {
        let value = self.get(field)?;
        value.as_bool().ok_or_else(|| Error::TypeError {
            expected: "bool".to_string(),
            got: value.type_name().to_string(),
        })
    }
}

/// Resolve a field's current value on `chain[0]`
///
/// Base fields read directly; computed fields honor a clean cache and
/// otherwise recompute recursively against the same chain.
pub(crate) fn value_on(
    registry: &Registry,
    dirty: &DirtyTracker,
    chain: &[&StateNode],
    field: &str,
    overlay: Option<&ValueMap>,
) -> Result<Value> {
    let node = chain[0];
    if let Some(staged) = overlay.and_then(|o| o.get(field)) {
        return Ok(staged.clone());
    }
    let spec = registry.node(&node.node_type)?;
    if spec.field(field).is_some() {
        return node
            .values
            .get(field)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("field {} on {}", field, node.path)));
    }
    if let Some(computed) = spec.computed(field) {
        if computed.cached && !dirty.is_dirty(&node.path, field) {
            if let Some(cached) = node.computed_cache.get(field) {
                return Ok(cached.clone());
            }
        }
        let scope = ComputeScope {
            registry,
            dirty,
            chain,
            overlay,
        };
        return (computed.compute)(&scope);
    }
    Err(Error::NotFound(format!(
        "field {} on {}",
        field, node.node_type
    )))
}

/// Undo journal for one handler step
#[derive(Debug, Default)]
struct StepJournal {
    /// Prior field values, first write wins
    values: Vec<(NodePath, String, Value)>,
    recorded_values: IndexSet<(NodePath, String)>,
    /// Prior computed-cache entries, first write wins
    caches: Vec<(NodePath, String, Option<Value>)>,
    recorded_caches: IndexSet<(NodePath, String)>,
    /// Prior dirty sets, first touch wins (None = node had no set)
    dirty_before: IndexMap<NodePath, Option<IndexSet<String>>>,
    /// Nodes materialized during this step, in creation order
    created: IndexSet<NodePath>,
}

impl StepJournal {
    fn record_value(&mut self, path: &NodePath, field: &str, old: Value) {
        if self.created.contains(path) {
            return;
        }
        let key = (path.clone(), field.to_string());
        if self.recorded_values.insert(key) {
            self.values.push((path.clone(), field.to_string(), old));
        }
    }

    fn record_cache(&mut self, path: &NodePath, field: &str, old: Option<Value>) {
        if self.created.contains(path) {
            return;
        }
        let key = (path.clone(), field.to_string());
        if self.recorded_caches.insert(key) {
            self.caches.push((path.clone(), field.to_string(), old));
        }
    }

    fn record_dirty(&mut self, path: &NodePath, before: Option<IndexSet<String>>) {
        if self.created.contains(path) || self.dirty_before.contains_key(path) {
            return;
        }
        self.dirty_before.insert(path.clone(), before);
    }

    fn record_created(&mut self, path: NodePath) {
        self.created.insert(path);
    }
}

/// A session's materialized state tree
#[derive(Debug)]
pub struct StateTree {
    pub(crate) registry: Arc<Registry>,
    pub(crate) root: StateNode,
    pub(crate) dirty: DirtyTracker,
    journal: Option<StepJournal>,
}

impl StateTree {
    /// Create a tree with a root node of the given type
    pub fn new(registry: Arc<Registry>, root_type: impl Into<NodeType>) -> Result<Self> {
        let root_type = root_type.into();
        registry.node(&root_type)?;
        let root = StateNode::from_spec(NodePath::root(), root_type, &registry);
        Ok(Self {
            registry,
            root,
            dirty: DirtyTracker::new(),
            journal: None,
        })
    }

    /// The registry this tree was built from
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A shared handle to the registry
    pub fn registry_arc(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// The root node
    pub fn root(&self) -> &StateNode {
        &self.root
    }

    /// Whether any field is waiting to be flushed
    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Resolve an already-materialized node
    pub fn node(&self, path: &NodePath) -> Result<&StateNode> {
        let mut segments = path.segments();
        if segments.next() != Some(ROOT_SEGMENT) {
            return Err(Error::NotFound(format!("node path: {}", path)));
        }
        let mut current = &self.root;
        for segment in segments {
            current = current
                .children
                .get(segment)
                .ok_or_else(|| Error::NotFound(format!("node path: {}", path)))?;
        }
        Ok(current)
    }

    pub(crate) fn node_mut(&mut self, path: &NodePath) -> Result<&mut StateNode> {
        let mut segments = path.segments();
        if segments.next() != Some(ROOT_SEGMENT) {
            return Err(Error::NotFound(format!("node path: {}", path)));
        }
        let mut current = &mut self.root;
        for segment in segments {
            current = current
                .children
                .get_mut(segment)
                .ok_or_else(|| Error::NotFound(format!("node path: {}", path)))?;
        }
        Ok(current)
    }

    /// Materialize every declared node along a path
    ///
    /// Newly created nodes are seeded with their declared defaults; their
    /// computed fields are marked dirty so a node born mid-session reaches
    /// the client at the next flush. Fails with [`Error::NotFound`] when a
    /// segment is not a declared child slot.
    pub fn materialize(&mut self, path: &NodePath) -> Result<()> {
        let StateTree {
            registry,
            root,
            dirty,
            journal,
        } = self;
        let mut segments = path.segments();
        if segments.next() != Some(ROOT_SEGMENT) {
            return Err(Error::NotFound(format!("node path: {}", path)));
        }
        let mut current = root;
        let mut current_path = NodePath::root();
        for segment in segments {
            current_path = current_path.child(segment);
            if !current.children.contains_key(segment) {
                let spec = registry.node(&current.node_type)?;
                let child_type = spec
                    .child(segment)
                    .ok_or_else(|| Error::NotFound(format!("node path: {}", current_path)))?
                    .clone();
                let child = StateNode::from_spec(current_path.clone(), child_type, registry);
                if let Some(journal) = journal.as_mut() {
                    journal.record_created(current_path.clone());
                }
                let child_spec = registry.node(&child.node_type)?;
                for computed in child_spec.computed_fields() {
                    dirty.mark(&current_path, &computed.name);
                }
                current.children.insert(segment.to_string(), child);
            }
            current = current
                .children
                .get_mut(segment)
                .ok_or_else(|| Error::NotFound(format!("node path: {}", current_path)))?;
        }
        Ok(())
    }

    /// The ancestor chain for a node: `[node, parent, .., root]`
    pub(crate) fn chain_for(&self, path: &NodePath) -> Result<Vec<&StateNode>> {
        let mut segments = path.segments();
        if segments.next() != Some(ROOT_SEGMENT) {
            return Err(Error::NotFound(format!("node path: {}", path)));
        }
        let mut chain = vec![&self.root];
        for segment in segments {
            let next = chain
                .last()
                .and_then(|node| node.children.get(segment))
                .ok_or_else(|| Error::NotFound(format!("node path: {}", path)))?;
            chain.push(next);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Read a field's current value
    ///
    /// Materializes the node if needed. A cached computed field that is
    /// not dirty returns its cached value without recomputation; a dirty
    /// or uncached one recomputes against current self/ancestor values.
    /// Recomputing refreshes the cache but leaves the flush-dirty mark in
    /// place - what reaches the client is decided at flush time.
    pub fn read(&mut self, path: &NodePath, field: &str) -> Result<Value> {
        self.materialize(path)?;
        let (value, update_cache) = {
            let chain = self.chain_for(path)?;
            let node = chain[0];
            let spec = self.registry.node(&node.node_type)?;
            if spec.field(field).is_some() {
                return node
                    .values
                    .get(field)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(format!("field {} on {}", field, path)));
            }
            let computed = spec
                .computed(field)
                .ok_or_else(|| Error::NotFound(format!("field {} on {}", field, path)))?;
            if computed.cached && !self.dirty.is_dirty(path, field) {
                if let Some(cached) = node.computed_cache.get(field) {
                    return Ok(cached.clone());
                }
            }
            let scope = ComputeScope {
                registry: &self.registry,
                dirty: &self.dirty,
                chain: &chain,
                overlay: None,
            };
            ((computed.compute)(&scope)?, computed.cached)
        };
        if update_cache {
            let StateTree { root, journal, .. } = self;
            let mut segments = path.segments();
            segments.next();
            let mut node = &mut *root;
            for segment in segments {
                node = node
                    .children
                    .get_mut(segment)
                    .ok_or_else(|| Error::NotFound(format!("node path: {}", path)))?;
            }
            if let Some(journal) = journal.as_mut() {
                journal.record_cache(path, field, node.computed_cache.get(field).cloned());
            }
            node.computed_cache.insert(field.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Write a base field
    ///
    /// No-op when the value is unchanged. Otherwise the value is stored,
    /// the dirty set is maintained against the last-sent baseline (a write
    /// back to the baseline un-marks the field), and every computed field
    /// that transitively reads this field - on this node or a descendant -
    /// is marked dirty.
    pub fn write(&mut self, path: &NodePath, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.materialize(path)?;

        let (old, matches_baseline) = {
            let node = self.node(path)?;
            let spec = self.registry.node(&node.node_type)?;
            if spec.computed(field).is_some() {
                return Err(Error::ReadOnly(format!("{}.{}", path, field)));
            }
            if spec.field(field).is_none() {
                return Err(Error::NotFound(format!("field {} on {}", field, path)));
            }
            let old = node
                .values
                .get(field)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("field {} on {}", field, path)))?;
            (old, node.baseline.get(field) == Some(&value))
        };
        if old == value {
            return Ok(());
        }

        let marks = self.propagation_targets(path, field)?;

        if self.journal.is_some() {
            let snapshots: Vec<(NodePath, Option<IndexSet<String>>)> = std::iter::once(path)
                .chain(marks.iter().map(|(p, _)| p))
                .map(|p| (p.clone(), self.dirty.node_set(p).cloned()))
                .collect();
            if let Some(journal) = self.journal.as_mut() {
                for (p, snapshot) in snapshots {
                    journal.record_dirty(&p, snapshot);
                }
                journal.record_value(path, field, old);
            }
        }

        self.node_mut(path)?
            .values
            .insert(field.to_string(), value);
        if matches_baseline {
            self.dirty.unmark(path, field);
        } else {
            self.dirty.mark(path, field);
        }
        for (mark_path, mark_field) in marks {
            self.dirty.mark(&mark_path, &mark_field);
        }
        Ok(())
    }

    /// Computed fields invalidated by a write to `path.field`
    ///
    /// Follows the registry's transitive reverse edges, then locates the
    /// affected instances: the written node itself and any node in its
    /// subtree whose type carries a dependent computed field.
    fn propagation_targets(&self, path: &NodePath, field: &str) -> Result<Vec<(NodePath, String)>> {
        let node = self.node(path)?;
        let dependents = self
            .registry
            .dependents_of(&FieldRef::new(node.node_type.clone(), field));
        if dependents.is_empty() {
            return Ok(Vec::new());
        }
        let mut targets = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            for dependent in &dependents {
                if dependent.node_type == current.node_type {
                    targets.push((current.path.clone(), dependent.field.clone()));
                }
            }
            stack.extend(current.children.values());
        }
        Ok(targets)
    }

    /// Begin a handler step: subsequent writes are journaled for rollback
    pub fn begin_step(&mut self) {
        debug_assert!(self.journal.is_none(), "step already active");
        self.journal = Some(StepJournal::default());
    }

    /// Commit the active step, keeping its writes
    pub fn commit_step(&mut self) {
        self.journal = None;
    }

    /// Abort the active step, discarding every write it made
    ///
    /// Restores prior values, cache entries, and dirty sets, and removes
    /// nodes the step materialized.
    pub fn abort_step(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (path, field, old) in journal.values.iter().rev() {
            if journal.created.contains(path) {
                continue;
            }
            if let Ok(node) = self.node_mut(path) {
                node.values.insert(field.clone(), old.clone());
            }
        }
        for (path, field, old) in journal.caches.iter().rev() {
            if journal.created.contains(path) {
                continue;
            }
            if let Ok(node) = self.node_mut(path) {
                match old {
                    Some(value) => {
                        node.computed_cache.insert(field.clone(), value.clone());
                    }
                    None => {
                        node.computed_cache.shift_remove(field);
                    }
                }
            }
        }
        for (path, snapshot) in journal.dirty_before {
            if journal.created.contains(&path) {
                continue;
            }
            self.dirty.restore_snapshot(path, snapshot);
        }
        for path in journal.created.iter().rev() {
            self.dirty.remove_node(path);
            if let Some(parent) = path.parent() {
                if let Ok(parent_node) = self.node_mut(&parent) {
                    parent_node.children.shift_remove(path.leaf());
                }
            }
        }
    }
}
