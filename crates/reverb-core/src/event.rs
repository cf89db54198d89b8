//! Event and outbound update types

use crate::delta::Delta;
use crate::path::HandlerPath;
use crate::snapshot::TreeSnapshot;
use crate::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token identifying one client session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap an existing token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A client-triggered event addressed to one handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Which handler to run (`<node-path>.<handler-name>`)
    pub handler: HandlerPath,
    /// Typed argument bag for the handler
    pub payload: ValueMap,
    /// The originating session
    pub token: SessionToken,
    /// Ambient client info (current route, viewport, ...)
    pub context: ValueMap,
}

impl Event {
    /// Create an event for a handler with an empty payload
    pub fn new(token: SessionToken, handler: impl Into<HandlerPath>) -> Self {
        Self {
            handler: handler.into(),
            payload: ValueMap::new(),
            token,
            context: ValueMap::new(),
        }
    }

    /// Add a payload parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Replace the payload wholesale
    pub fn with_payload(mut self, payload: ValueMap) -> Self {
        self.payload = payload;
        self
    }

    /// Add a client-context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// An event directed at the client rather than the server
///
/// Diagnostics ride in the outbound update's event list: an unknown
/// handler path or a failed handler produces one of these alongside an
/// empty delta instead of a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Event name the client dispatches on
    pub name: String,
    /// Event arguments
    pub payload: ValueMap,
}

impl ClientEvent {
    /// Create a client event with an empty payload
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: ValueMap::new(),
        }
    }

    /// Add a payload parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// One outbound message to a session's client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Update {
    /// Full state for first paint
    Hydrate(TreeSnapshot),
    /// Minimal patch plus any client-directed events
    Delta {
        /// Changed fields since the previous update
        delta: Delta,
        /// Diagnostics and other client-directed events
        events: Vec<ClientEvent>,
    },
}

impl Update {
    /// A delta update with no events
    pub fn delta(delta: Delta) -> Self {
        Update::Delta {
            delta,
            events: Vec::new(),
        }
    }

    /// An empty failure delta carrying only diagnostics
    pub fn diagnostics(events: Vec<ClientEvent>) -> Self {
        Update::Delta {
            delta: Delta::new(),
            events,
        }
    }
}
