//! Dirty tracker - per-node record of fields changed since the last flush

use crate::path::NodePath;
use indexmap::{IndexMap, IndexSet};

/// Tracks, per node path, the fields that differ from what the client last
/// saw
///
/// Marking is idempotent. The tracker supports taking a node's set out for
/// a flush pass and restoring it unchanged when that node's flush fails,
/// which is what keeps a compute error from dropping pending updates.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    sets: IndexMap<NodePath, IndexSet<String>>,
}

impl DirtyTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a field dirty; returns true if it was newly marked
    pub fn mark(&mut self, path: &NodePath, field: &str) -> bool {
        self.sets
            .entry(path.clone())
            .or_default()
            .insert(field.to_string())
    }

    /// Remove a field's dirty mark (a write returned it to the last-sent
    /// value)
    pub fn unmark(&mut self, path: &NodePath, field: &str) {
        if let Some(set) = self.sets.get_mut(path) {
            set.shift_remove(field);
            if set.is_empty() {
                self.sets.shift_remove(path);
            }
        }
    }

    /// Check whether a field is marked dirty
    pub fn is_dirty(&self, path: &NodePath, field: &str) -> bool {
        self.sets.get(path).is_some_and(|set| set.contains(field))
    }

    /// Get a node's dirty set, if any field is marked
    pub fn node_set(&self, path: &NodePath) -> Option<&IndexSet<String>> {
        self.sets.get(path)
    }

    /// Remove and return a node's dirty set for a flush pass
    pub fn take_node(&mut self, path: &NodePath) -> Option<IndexSet<String>> {
        self.sets.shift_remove(path)
    }

    /// Put a node's dirty set back (flush rollback)
    pub fn restore_node(&mut self, path: NodePath, set: IndexSet<String>) {
        if !set.is_empty() {
            self.sets.insert(path, set);
        }
    }

    /// Replace a node's dirty set with a snapshot (step rollback)
    ///
    /// `None` means the node had no dirty set at snapshot time.
    pub fn restore_snapshot(&mut self, path: NodePath, set: Option<IndexSet<String>>) {
        match set {
            Some(set) if !set.is_empty() => {
                self.sets.insert(path, set);
            }
            _ => {
                self.sets.shift_remove(&path);
            }
        }
    }

    /// Drop every mark for a node (node destruction)
    pub fn remove_node(&mut self, path: &NodePath) {
        self.sets.shift_remove(path);
    }

    /// Iterate the paths that currently have dirty fields
    pub fn paths(&self) -> impl Iterator<Item = &NodePath> {
        self.sets.keys()
    }

    /// Check whether anything is dirty
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Clear all marks (full snapshot sent)
    pub fn clear(&mut self) {
        self.sets.clear();
    }
}
