//! JSON codec for wire frames

use crate::message::{ClientMessage, ServerMessage};

/// Encode an outbound frame
pub fn encode_server(message: &ServerMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Decode an outbound frame (client side)
pub fn decode_server(raw: &str) -> serde_json::Result<ServerMessage> {
    serde_json::from_str(raw)
}

/// Encode an inbound frame (client side)
pub fn encode_client(message: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Decode an inbound frame
pub fn decode_client(raw: &str) -> serde_json::Result<ClientMessage> {
    serde_json::from_str(raw)
}
