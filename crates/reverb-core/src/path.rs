//! Path and identifier types for the state tree

use serde::{Deserialize, Serialize};
use std::fmt;

/// The name of the root node in every session tree
pub const ROOT_SEGMENT: &str = "root";

/// Dotted path addressing a node in a session tree (e.g. `root.cart.items`)
///
/// The first segment is always [`ROOT_SEGMENT`]. Paths sort
/// lexicographically, which places parents ahead of their descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    /// The path of the tree root
    pub fn root() -> Self {
        Self(ROOT_SEGMENT.to_string())
    }

    /// Create a path from a dotted string
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the dot-separated segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The last segment (the node's own name)
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The parent path, or None for the root
    pub fn parent(&self) -> Option<NodePath> {
        self.0.rfind('.').map(|idx| NodePath(self.0[..idx].to_string()))
    }

    /// Extend this path with a child segment
    pub fn child(&self, name: &str) -> NodePath {
        NodePath(format!("{}.{}", self.0, name))
    }

    /// Check whether this is the root path
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_SEGMENT
    }

    /// Check whether `other` lies strictly below this path
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Stable identifier for a node type registered in the [`Registry`]
///
/// Node types key the static declaration tables; node instances in a
/// session tree each carry the type they were constructed from.
///
/// [`Registry`]: crate::Registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(String);

impl NodeType {
    /// Create a new node type identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Reference to a declared or computed field on a node type
///
/// Dependency edges in the registry are sets of field refs; a computed
/// field may reference fields on its own type or on an ancestor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// The node type owning the field
    pub node_type: NodeType,
    /// The field name
    pub field: String,
}

impl FieldRef {
    /// Create a new field reference
    pub fn new(node_type: impl Into<NodeType>, field: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_type, self.field)
    }
}

/// Path addressing a handler on a node (`<node-path>.<handler-name>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerPath(String);

impl HandlerPath {
    /// Create a handler path from a dotted string
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Build a handler path from a node path and handler name
    pub fn for_node(node: &NodePath, handler: &str) -> Self {
        Self(format!("{}.{}", node, handler))
    }

    /// Get the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the target node path and handler name
    ///
    /// Returns None when the path has no node portion (a bare name).
    pub fn split(&self) -> Option<(NodePath, &str)> {
        self.0
            .rfind('.')
            .map(|idx| (NodePath::new(&self.0[..idx]), &self.0[idx + 1..]))
    }
}

impl fmt::Display for HandlerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HandlerPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments() {
        let path = NodePath::new("root.cart.items");
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments, vec!["root", "cart", "items"]);
        assert_eq!(path.leaf(), "items");
        assert_eq!(path.parent(), Some(NodePath::new("root.cart")));
    }

    #[test]
    fn test_path_root() {
        let root = NodePath::root();
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.child("cart"), NodePath::new("root.cart"));
    }

    #[test]
    fn test_path_ancestry() {
        let root = NodePath::root();
        let cart = NodePath::new("root.cart");
        let items = NodePath::new("root.cart.items");
        assert!(root.is_ancestor_of(&items));
        assert!(cart.is_ancestor_of(&items));
        assert!(!items.is_ancestor_of(&cart));
        assert!(!cart.is_ancestor_of(&cart));
        // Prefix of a segment is not an ancestor
        assert!(!cart.is_ancestor_of(&NodePath::new("root.cartel")));
    }

    #[test]
    fn test_handler_path_split() {
        let path = HandlerPath::new("root.counter.increment");
        let (node, name) = path.split().unwrap();
        assert_eq!(node, NodePath::new("root.counter"));
        assert_eq!(name, "increment");

        assert_eq!(HandlerPath::new("increment").split(), None);
    }

    #[test]
    fn test_field_ref_display() {
        let field = FieldRef::new("counter", "count");
        assert_eq!(format!("{}", field), "counter.count");
    }
}
