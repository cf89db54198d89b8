//! Var Registry - static declaration tables for node types
//!
//! The registry describes, per node type, the declared fields (with
//! defaults), the computed fields (with their compute function, declared
//! dependencies, and caching mode), and the child slots a node of that type
//! may materialize. It is built once at startup and shared read-only by
//! every session tree.
//!
//! Dependency edges are validated eagerly: registering a computed field
//! whose dependencies are unknown, or whose dependency graph would contain
//! a cycle, fails with [`Error::Configuration`] instead of surfacing as a
//! stale value at runtime.

use crate::error::{Error, Result};
use crate::path::{FieldRef, NodePath, NodeType};
use crate::tree::ComputeScope;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// A pure function deriving a computed field's value from other fields
pub type ComputeFn = Arc<dyn Fn(&ComputeScope<'_>) -> Result<Value> + Send + Sync>;

/// A declared base field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Default value a new node is seeded with
    pub default: Value,
}

/// A declared computed field
#[derive(Clone)]
pub struct ComputedSpec {
    /// Field name
    pub name: String,
    /// Fields this computation reads (same node type or an ancestor type)
    pub depends_on: IndexSet<FieldRef>,
    /// Whether the computed value is cached between recomputes
    pub cached: bool,
    /// The compute function
    pub compute: ComputeFn,
}

impl std::fmt::Debug for ComputedSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedSpec")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("cached", &self.cached)
            .finish()
    }
}

/// Declarations for one node type
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    fields: IndexMap<String, FieldSpec>,
    computed: IndexMap<String, ComputedSpec>,
    children: IndexMap<String, NodeType>,
}

impl NodeSpec {
    /// Get a declared base field
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Get a declared computed field
    pub fn computed(&self, name: &str) -> Option<&ComputedSpec> {
        self.computed.get(name)
    }

    /// Get a declared child slot's node type
    pub fn child(&self, name: &str) -> Option<&NodeType> {
        self.children.get(name)
    }

    /// Iterate declared base fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    /// Iterate declared computed fields in declaration order
    pub fn computed_fields(&self) -> impl Iterator<Item = &ComputedSpec> {
        self.computed.values()
    }

    /// Iterate declared child slots
    pub fn children(&self) -> impl Iterator<Item = (&String, &NodeType)> {
        self.children.iter()
    }

    /// Check whether `name` is declared as a base or computed field
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.computed.contains_key(name)
    }
}

/// Static registry of node types, fields, and dependency edges
///
/// Built once at startup; registration order matters in one way only:
/// a dependency must already be registered when it is referenced, which is
/// what makes the dependency graph acyclic by construction. A defensive
/// cycle check runs on every computed registration regardless.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: IndexMap<NodeType, NodeSpec>,
    /// Direct reverse edges: field -> computed fields reading it
    dependents: IndexMap<FieldRef, IndexSet<FieldRef>>,
    /// Per-type recompute order (same-node dependencies first)
    recompute_order: IndexMap<NodeType, Vec<String>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node type
    pub fn register_node(&mut self, node_type: impl Into<NodeType>) -> Result<()> {
        let node_type = node_type.into();
        if self.nodes.contains_key(&node_type) {
            return Err(Error::Configuration(format!(
                "node type already registered: {}",
                node_type
            )));
        }
        self.nodes.insert(node_type, NodeSpec::default());
        Ok(())
    }

    /// Declare a base field with its default value
    pub fn register_field(
        &mut self,
        node_type: impl Into<NodeType>,
        name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Result<()> {
        let node_type = node_type.into();
        let name = name.into();
        let spec = self.node_spec_mut(&node_type)?;
        if spec.has_field(&name) {
            return Err(Error::Configuration(format!(
                "field already registered: {}.{}",
                node_type, name
            )));
        }
        spec.fields.insert(
            name.clone(),
            FieldSpec {
                name,
                default: default.into(),
            },
        );
        Ok(())
    }

    /// Declare a computed field
    ///
    /// `depends_on` must name fields that are already registered; every
    /// write to one of them marks this computed field dirty. Fails fast
    /// with [`Error::Configuration`] on unknown dependencies or a cycle.
    pub fn register_computed(
        &mut self,
        node_type: impl Into<NodeType>,
        name: impl Into<String>,
        depends_on: Vec<FieldRef>,
        cached: bool,
        compute: impl Fn(&ComputeScope<'_>) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<()> {
        let node_type = node_type.into();
        let name = name.into();
        let target = FieldRef::new(node_type.clone(), name.clone());

        {
            let spec = self.node_spec(&node_type)?;
            if spec.has_field(&name) {
                return Err(Error::Configuration(format!(
                    "field already registered: {}",
                    target
                )));
            }
        }
        for dep in &depends_on {
            let dep_spec = self.nodes.get(&dep.node_type).ok_or_else(|| {
                Error::Configuration(format!("unknown dependency node type: {}", dep))
            })?;
            if !dep_spec.has_field(&dep.field) {
                return Err(Error::Configuration(format!("unknown dependency: {}", dep)));
            }
        }
        if self.would_cycle(&target, &depends_on) {
            return Err(Error::Configuration(format!(
                "dependency cycle through computed field: {}",
                target
            )));
        }

        let deps: IndexSet<FieldRef> = depends_on.iter().cloned().collect();
        for dep in &depends_on {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(target.clone());
        }
        let spec = self.node_spec_mut(&node_type)?;
        spec.computed.insert(
            name.clone(),
            ComputedSpec {
                name,
                depends_on: deps,
                cached,
                compute: Arc::new(compute),
            },
        );
        self.rebuild_recompute_order(&node_type);
        Ok(())
    }

    /// Declare a child slot on a node type
    ///
    /// The child's node type must already be registered, so lazy
    /// construction always finds a complete spec.
    pub fn register_child(
        &mut self,
        node_type: impl Into<NodeType>,
        name: impl Into<String>,
        child_type: impl Into<NodeType>,
    ) -> Result<()> {
        let node_type = node_type.into();
        let name = name.into();
        let child_type = child_type.into();
        if !self.nodes.contains_key(&child_type) {
            return Err(Error::Configuration(format!(
                "unknown child node type: {}",
                child_type
            )));
        }
        let spec = self.node_spec_mut(&node_type)?;
        if spec.children.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "child slot already registered: {}.{}",
                node_type, name
            )));
        }
        spec.children.insert(name, child_type);
        Ok(())
    }

    /// Look up a node type's declarations
    pub fn node(&self, node_type: &NodeType) -> Result<&NodeSpec> {
        self.nodes
            .get(node_type)
            .ok_or_else(|| Error::NotFound(format!("node type: {}", node_type)))
    }

    /// Check whether a node type is registered
    pub fn has_node(&self, node_type: &NodeType) -> bool {
        self.nodes.contains_key(node_type)
    }

    /// All computed fields that (transitively) read the given field
    ///
    /// This is the set the dirty tracker invalidates when the field is
    /// written; it follows computed-on-computed edges to closure.
    pub fn dependents_of(&self, field: &FieldRef) -> IndexSet<FieldRef> {
        let mut out = IndexSet::new();
        let mut stack = vec![field.clone()];
        while let Some(current) = stack.pop() {
            if let Some(direct) = self.dependents.get(&current) {
                for dep in direct {
                    if out.insert(dep.clone()) {
                        stack.push(dep.clone());
                    }
                }
            }
        }
        out
    }

    /// Recompute order for a node type's computed fields
    ///
    /// Same-node dependencies come before their dependents; the order is
    /// fixed at registration time.
    pub fn recompute_order(&self, node_type: &NodeType) -> &[String] {
        self.recompute_order
            .get(node_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve the node type a path addresses, by declarations alone
    ///
    /// Walks declared child slots from the root type without touching any
    /// tree, so an event for a bogus path can be rejected before state is
    /// materialized.
    pub fn resolve_path_type(&self, root_type: &NodeType, path: &NodePath) -> Result<NodeType> {
        let mut segments = path.segments();
        if segments.next() != Some(crate::path::ROOT_SEGMENT) {
            return Err(Error::NotFound(format!("node path: {}", path)));
        }
        let mut current = root_type.clone();
        for segment in segments {
            let spec = self.node(&current)?;
            current = spec
                .child(segment)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("node path: {}", path)))?;
        }
        self.node(&current)?;
        Ok(current)
    }

    fn node_spec(&self, node_type: &NodeType) -> Result<&NodeSpec> {
        self.nodes.get(node_type).ok_or_else(|| {
            Error::Configuration(format!("node type not registered: {}", node_type))
        })
    }

    fn node_spec_mut(&mut self, node_type: &NodeType) -> Result<&mut NodeSpec> {
        self.nodes.get_mut(node_type).ok_or_else(|| {
            Error::Configuration(format!("node type not registered: {}", node_type))
        })
    }

    /// Check whether adding `target` with the given dependencies would close
    /// a cycle in the computed-field graph
    fn would_cycle(&self, target: &FieldRef, depends_on: &[FieldRef]) -> bool {
        let mut stack: Vec<FieldRef> = depends_on.to_vec();
        let mut seen = IndexSet::new();
        while let Some(current) = stack.pop() {
            if &current == target {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(spec) = self.nodes.get(&current.node_type) {
                if let Some(computed) = spec.computed.get(&current.field) {
                    stack.extend(computed.depends_on.iter().cloned());
                }
            }
        }
        false
    }

    /// Rebuild the per-type recompute order after a computed registration
    fn rebuild_recompute_order(&mut self, node_type: &NodeType) {
        let spec = match self.nodes.get(node_type) {
            Some(spec) => spec,
            None => return,
        };
        let mut order = Vec::new();
        let mut visited = IndexSet::new();
        for name in spec.computed.keys() {
            visit_computed(spec, node_type, name, &mut visited, &mut order);
        }
        self.recompute_order.insert(node_type.clone(), order);
    }
}

/// Post-order walk of same-node computed dependencies
fn visit_computed(
    spec: &NodeSpec,
    node_type: &NodeType,
    name: &str,
    visited: &mut IndexSet<String>,
    order: &mut Vec<String>,
) {
    if visited.contains(name) {
        return;
    }
    visited.insert(name.to_string());
    if let Some(computed) = spec.computed.get(name) {
        for dep in &computed.depends_on {
            if &dep.node_type == node_type && spec.computed.contains_key(&dep.field) {
                visit_computed(spec, node_type, &dep.field, visited, order);
            }
        }
    }
    order.push(name.to_string());
}
