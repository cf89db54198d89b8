//! Session state and the handler registry

use crate::handler::EventHandler;
use indexmap::IndexMap;
use reverb_core::{NodeType, SessionToken, StateTree};
use std::sync::Arc;

/// One client's materialized state
///
/// The tree lives exactly as long as the session: created on first
/// contact, dropped on logout, expiry, or shutdown. Queueing and delivery
/// bookkeeping live in the engine's session store, not here.
pub struct Session {
    /// The owning client's token
    pub token: SessionToken,
    /// The session's state tree
    pub tree: StateTree,
}

impl Session {
    /// Create a session around a freshly built or restored tree
    pub fn new(token: SessionToken, tree: StateTree) -> Self {
        Self { token, tree }
    }
}

/// Handler implementations keyed by node type and name
///
/// Shared read-only by the engine; the same handler instance serves every
/// session, with per-invocation state created by
/// [`EventHandler::start`].
#[derive(Default, Clone)]
pub struct Handlers {
    map: IndexMap<NodeType, IndexMap<String, Arc<dyn EventHandler>>>,
}

impl Handlers {
    /// Create an empty handler registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a node type and name
    pub fn register(
        &mut self,
        node_type: impl Into<NodeType>,
        name: impl Into<String>,
        handler: impl EventHandler + 'static,
    ) {
        self.map
            .entry(node_type.into())
            .or_default()
            .insert(name.into(), Arc::new(handler));
    }

    /// Look up a handler
    pub fn get(&self, node_type: &NodeType, name: &str) -> Option<Arc<dyn EventHandler>> {
        self.map.get(node_type)?.get(name).cloned()
    }

    /// Check whether a handler is registered
    pub fn contains(&self, node_type: &NodeType, name: &str) -> bool {
        self.map
            .get(node_type)
            .is_some_and(|handlers| handlers.contains_key(name))
    }
}
