//! Wire-level message types
//!
//! Both enums serialize untagged so the frames match the protocol
//! directly: an inbound event is `{"handler": .., "payload": .., "token": ..}`,
//! an outbound update is `{"delta": {..}, "events": [..]}`. Keepalive
//! frames use a single distinguishing key (`ping` / `pong`).

use indexmap::IndexMap;
use reverb_core::{ClientEvent, Event, HandlerPath, SessionToken, Update, ValueMap};
use serde::{Deserialize, Serialize};

/// A frame from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// A user-triggered event
    Event {
        /// `<node-path>.<handler-name>`
        handler: String,
        /// Arguments for the handler
        #[serde(default)]
        payload: ValueMap,
        /// The originating session's token
        token: String,
        /// Ambient client info (current route, ...)
        #[serde(default)]
        context: ValueMap,
    },
    /// Keepalive probe
    Ping {
        /// Millisecond timestamp echoed back in the pong
        ping: u64,
    },
}

impl ClientMessage {
    /// Build the wire frame for an engine event
    pub fn from_event(event: &Event) -> Self {
        ClientMessage::Event {
            handler: event.handler.as_str().to_string(),
            payload: event.payload.clone(),
            token: event.token.as_str().to_string(),
            context: event.context.clone(),
        }
    }

    /// Convert an event frame into an engine event
    ///
    /// Returns None for non-event frames.
    pub fn into_event(self) -> Option<Event> {
        match self {
            ClientMessage::Event {
                handler,
                payload,
                token,
                context,
            } => Some(Event {
                handler: HandlerPath::new(handler),
                payload,
                token: SessionToken::new(token),
                context,
            }),
            ClientMessage::Ping { .. } => None,
        }
    }
}

/// A client-directed event as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event name the client dispatches on
    pub name: String,
    /// Event arguments
    #[serde(default)]
    pub payload: ValueMap,
}

impl From<ClientEvent> for WireEvent {
    fn from(event: ClientEvent) -> Self {
        Self {
            name: event.name,
            payload: event.payload,
        }
    }
}

/// A frame from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Full state for first paint
    Hydrate {
        /// Node path to every field's value
        state: IndexMap<String, ValueMap>,
    },
    /// Minimal patch plus client-directed events
    Delta {
        /// Node path to changed fields only
        delta: IndexMap<String, ValueMap>,
        /// Diagnostics and other client-directed events
        events: Vec<WireEvent>,
    },
    /// Keepalive reply
    Pong {
        /// The timestamp from the matching ping
        pong: u64,
    },
}

impl From<Update> for ServerMessage {
    fn from(update: Update) -> Self {
        match update {
            Update::Hydrate(snapshot) => ServerMessage::Hydrate {
                state: snapshot
                    .nodes
                    .into_iter()
                    .map(|(path, node)| (path.as_str().to_string(), node.fields))
                    .collect(),
            },
            Update::Delta { delta, events } => ServerMessage::Delta {
                delta: delta
                    .into_inner()
                    .into_iter()
                    .map(|(path, fields)| (path.as_str().to_string(), fields))
                    .collect(),
                events: events.into_iter().map(WireEvent::from).collect(),
            },
        }
    }
}
