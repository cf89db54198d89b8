//! Full-state tree snapshots for hydration and archiving
//!
//! A [`TreeSnapshot`] captures every materialized node with all of its
//! fields, computed values included - the shape a client needs for first
//! paint, and the shape a session archive stores between events. Nodes
//! appear parent-first so restoring can materialize along the way.

use crate::error::{Error, Result};
use crate::path::{NodePath, NodeType};
use crate::registry::Registry;
use crate::tree::{value_on, StateNode, StateTree};
use crate::value::ValueMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One node's full state: every base and computed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// The node's registered type
    pub node_type: NodeType,
    /// All field values, computed fields included
    pub fields: ValueMap,
}

/// Full state of a session tree, parent-first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Node path to full node state
    pub nodes: IndexMap<NodePath, NodeSnapshot>,
}

impl TreeSnapshot {
    /// Get a node's snapshot
    pub fn get(&self, path: &NodePath) -> Option<&NodeSnapshot> {
        self.nodes.get(path)
    }

    /// Number of captured nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl StateTree {
    /// Capture the full tree without touching dirty state or baselines
    ///
    /// Computed fields are evaluated against current values; clean caches
    /// are honored. Used for archive checkpoints, where the client's view
    /// must not be disturbed.
    pub fn snapshot(&self) -> Result<TreeSnapshot> {
        let mut nodes = IndexMap::new();
        let mut ancestors = Vec::new();
        collect(&self.registry, self, &mut ancestors, &self.root, &mut nodes)?;
        Ok(TreeSnapshot { nodes })
    }

    /// Capture the full tree and mark all of it as sent
    ///
    /// This is the hydrate path: baselines move to current values, caches
    /// are refreshed from the captured computed values, and the dirty
    /// tracker is cleared - the client now knows everything.
    pub fn hydrate(&mut self) -> Result<TreeSnapshot> {
        let snapshot = self.snapshot()?;
        self.dirty.clear();
        let registry = Arc::clone(&self.registry);
        for (path, node_snapshot) in snapshot.nodes.iter() {
            let Ok(node) = self.node_mut(path) else {
                continue;
            };
            node.baseline = node.values.clone();
            let Ok(spec) = registry.node(&node.node_type) else {
                continue;
            };
            for computed in spec.computed_fields() {
                if computed.cached {
                    if let Some(value) = node_snapshot.fields.get(&computed.name) {
                        node.computed_cache.insert(computed.name.clone(), value.clone());
                    }
                }
            }
        }
        Ok(snapshot)
    }

    /// Rebuild a tree from an archived snapshot
    ///
    /// The snapshot must come from the same registry declarations: every
    /// path must be reachable through declared child slots and node types
    /// must match. Restored values become the baseline; the tree comes
    /// back with nothing dirty (a fresh hydrate follows on reconnect).
    pub fn restore(registry: Arc<Registry>, snapshot: &TreeSnapshot) -> Result<StateTree> {
        let root_snapshot = snapshot
            .nodes
            .get(&NodePath::root())
            .ok_or_else(|| Error::Configuration("snapshot missing root node".to_string()))?;
        let mut tree = StateTree::new(Arc::clone(&registry), root_snapshot.node_type.clone())?;
        for (path, node_snapshot) in snapshot.nodes.iter() {
            tree.materialize(path)?;
            let spec = registry.node(&node_snapshot.node_type)?;
            let field_names: Vec<String> = spec.fields().map(|f| f.name.clone()).collect();
            let node = tree.node_mut(path)?;
            if node.node_type != node_snapshot.node_type {
                return Err(Error::Configuration(format!(
                    "snapshot node type mismatch at {}: {} vs {}",
                    path, node.node_type, node_snapshot.node_type
                )));
            }
            for name in field_names {
                if let Some(value) = node_snapshot.fields.get(&name) {
                    node.values.insert(name, value.clone());
                }
            }
            node.baseline = node.values.clone();
        }
        tree.dirty.clear();
        Ok(tree)
    }
}

/// Depth-first, parent-first capture
fn collect<'a>(
    registry: &Registry,
    tree: &StateTree,
    ancestors: &mut Vec<&'a StateNode>,
    node: &'a StateNode,
    out: &mut IndexMap<NodePath, NodeSnapshot>,
) -> Result<()> {
    let mut chain: Vec<&StateNode> = Vec::with_capacity(ancestors.len() + 1);
    chain.push(node);
    chain.extend(ancestors.iter().rev().copied());

    let spec = registry.node(&node.node_type)?;
    let mut fields = node.values.clone();
    for computed in spec.computed_fields() {
        let value = value_on(registry, &tree.dirty, &chain, &computed.name, None).map_err(
            |error| Error::Recompute {
                field: format!("{}.{}", node.path, computed.name),
                reason: error.to_string(),
            },
        )?;
        fields.insert(computed.name.clone(), value);
    }
    out.insert(
        node.path.clone(),
        NodeSnapshot {
            node_type: node.node_type.clone(),
            fields,
        },
    );

    ancestors.push(node);
    for child in node.children.values() {
        collect(registry, tree, ancestors, child, out)?;
    }
    ancestors.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FieldRef;
    use crate::value::Value;

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register_node("app").unwrap();
        registry.register_field("app", "title", Value::String("shop".into())).unwrap();
        registry.register_node("cart").unwrap();
        registry.register_field("cart", "items", Value::List(vec![])).unwrap();
        registry
            .register_computed(
                "cart",
                "size",
                vec![FieldRef::new("cart", "items")],
                true,
                |scope| {
                    let items = scope.get("items")?;
                    let len = items.as_list().map(|l| l.len()).unwrap_or(0);
                    Ok(Value::Int(len as i64))
                },
            )
            .unwrap();
        registry.register_child("app", "cart", "cart").unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_snapshot_contains_every_field() {
        let mut tree = StateTree::new(registry(), "app").unwrap();
        let cart = NodePath::new("root.cart");
        tree.write(&cart, "items", vec!["apple", "pear"]).unwrap();

        let snapshot = tree.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        let root = snapshot.get(&NodePath::root()).unwrap();
        assert_eq!(root.fields.get("title"), Some(&Value::String("shop".into())));
        let cart_snapshot = snapshot.get(&cart).unwrap();
        assert_eq!(cart_snapshot.fields.get("size"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_hydrate_clears_pending_changes() {
        let mut tree = StateTree::new(registry(), "app").unwrap();
        tree.write(&NodePath::new("root.cart"), "items", vec!["apple"]).unwrap();

        tree.hydrate().unwrap();
        let report = tree.flush();
        assert!(report.delta.is_empty());
    }

    #[test]
    fn test_restore_round_trip() {
        let registry = registry();
        let mut tree = StateTree::new(Arc::clone(&registry), "app").unwrap();
        tree.write(&NodePath::root(), "title", "bakery").unwrap();
        tree.write(&NodePath::new("root.cart"), "items", vec!["rye"]).unwrap();
        let snapshot = tree.snapshot().unwrap();

        let mut restored = StateTree::restore(registry, &snapshot).unwrap();
        assert_eq!(
            restored.read(&NodePath::root(), "title").unwrap(),
            Value::String("bakery".into())
        );
        assert_eq!(
            restored.read(&NodePath::new("root.cart"), "size").unwrap(),
            Value::Int(1)
        );
        // Nothing pending: the restored values are the baseline
        assert!(restored.flush().delta.is_empty());
    }

    #[test]
    fn test_snapshot_ron_round_trip() {
        let mut tree = StateTree::new(registry(), "app").unwrap();
        tree.write(&NodePath::new("root.cart"), "items", vec!["apple"]).unwrap();
        let snapshot = tree.snapshot().unwrap();

        let serialized = ron::to_string(&snapshot).expect("serialize");
        let deserialized: TreeSnapshot = ron::from_str(&serialized).expect("deserialize");
        assert_eq!(deserialized, snapshot);
    }

    #[test]
    fn test_restore_missing_root_fails() {
        let err = StateTree::restore(registry(), &TreeSnapshot::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
