//! Delta builder - minimal patches of changed fields
//!
//! A flush drains the dirty tracker into a [`Delta`]: node path to the
//! map of fields whose values the client has not seen yet. Base fields are
//! filtered against the last-sent baseline (a field written and then
//! written back never ships); computed fields ship whenever they were
//! marked, because presence in the dirty set at flush time is
//! authoritative, not value equality.

use crate::error::Error;
use crate::path::NodePath;
use crate::tree::{ComputeScope, StateTree};
use crate::value::ValueMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimal patch: node path to changed fields
///
/// Never contains a node path with an empty field map. Iteration order is
/// sorted by path, so a given set of writes always produces the same
/// patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta(IndexMap<NodePath, ValueMap>);

impl Delta {
    /// Create an empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node's changed fields; empty maps are dropped
    pub fn insert(&mut self, path: NodePath, fields: ValueMap) {
        if !fields.is_empty() {
            self.0.insert(path, fields);
        }
    }

    /// Get a node's changed fields
    pub fn get(&self, path: &NodePath) -> Option<&ValueMap> {
        self.0.get(path)
    }

    /// Check whether the delta carries no changes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of nodes with changes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate node entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&NodePath, &ValueMap)> {
        self.0.iter()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> IndexMap<NodePath, ValueMap> {
        self.0
    }
}

/// One node whose flush was rolled back by a compute failure
#[derive(Debug, Clone)]
pub struct FlushFailure {
    /// The node whose dirty set was restored
    pub path: NodePath,
    /// The computed field whose function failed
    pub field: String,
    /// The failure rendered for diagnostics
    pub reason: String,
}

/// Result of draining the dirty tracker
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    /// Changed fields for every node that flushed cleanly
    pub delta: Delta,
    /// Nodes rolled back to their pre-flush dirty state
    pub failures: Vec<FlushFailure>,
}

impl FlushReport {
    /// Check whether every dirty node flushed without failure
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl StateTree {
    /// Drain dirty fields into a [`Delta`], clearing the dirty state
    ///
    /// Nodes flush independently in path order: a compute failure re-marks
    /// that node (pre-flush dirty state restored) and is reported, while
    /// every other node's flush stands. Recomputation runs against current
    /// self/ancestor values, with same-node computed dependencies staged
    /// in registry order so dependents read fresh values.
    pub fn flush(&mut self) -> FlushReport {
        let registry = Arc::clone(&self.registry);
        let mut delta = Delta::new();
        let mut failures = Vec::new();

        let mut paths: Vec<NodePath> = self.dirty.paths().cloned().collect();
        paths.sort();

        for path in paths {
            let Some(set) = self.dirty.take_node(&path) else {
                continue;
            };
            // A node removed after being marked has nothing to report
            let Ok(chain) = self.chain_for(&path) else {
                continue;
            };
            let node_type = chain[0].node_type.clone();
            let Ok(spec) = registry.node(&node_type) else {
                continue;
            };

            // Recompute phase: pure, staged, nothing touched on failure
            let mut staged = ValueMap::new();
            let mut failed: Option<(String, Error)> = None;
            for name in registry.recompute_order(&node_type) {
                if !set.contains(name) {
                    continue;
                }
                let Some(computed) = spec.computed(name) else {
                    continue;
                };
                let scope = ComputeScope {
                    registry: &registry,
                    dirty: &self.dirty,
                    chain: &chain,
                    overlay: Some(&staged),
                };
                match (computed.compute)(&scope) {
                    Ok(value) => {
                        staged.insert(name.clone(), value);
                    }
                    Err(error) => {
                        failed = Some((name.clone(), error));
                        break;
                    }
                }
            }
            drop(chain);

            if let Some((field, error)) = failed {
                self.dirty.restore_node(path.clone(), set);
                failures.push(FlushFailure {
                    path,
                    field,
                    reason: error.to_string(),
                });
                continue;
            }

            // Apply phase: declared base fields first, then computed, both
            // in declaration order for a deterministic patch
            let base_order: Vec<String> = spec
                .fields()
                .map(|field| field.name.clone())
                .filter(|name| set.contains(name))
                .collect();
            let computed_order: Vec<(String, bool)> = registry
                .recompute_order(&node_type)
                .iter()
                .filter(|name| set.contains(*name))
                .map(|name| {
                    let cached = spec.computed(name).map(|c| c.cached).unwrap_or(false);
                    (name.clone(), cached)
                })
                .collect();

            let Ok(node) = self.node_mut(&path) else {
                continue;
            };
            let mut fields_out = ValueMap::new();
            for name in base_order {
                let Some(value) = node.values.get(&name).cloned() else {
                    continue;
                };
                if node.baseline.get(&name) != Some(&value) {
                    node.baseline.insert(name.clone(), value.clone());
                    fields_out.insert(name, value);
                }
            }
            for (name, cached) in computed_order {
                if let Some(value) = staged.get(&name) {
                    if cached {
                        node.computed_cache.insert(name.clone(), value.clone());
                    }
                    fields_out.insert(name, value.clone());
                }
            }
            delta.insert(path, fields_out);
        }

        FlushReport { delta, failures }
    }
}
