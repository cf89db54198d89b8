//! Reverb Wire - the transport adapter boundary
//!
//! Wire frames for the synchronization protocol and the duplex-transport
//! trait adapters implement. The engine itself never sees a socket: a
//! transport decodes [`ClientMessage`] frames into events, feeds them to
//! the engine, and pumps the session's updates back out as
//! [`ServerMessage`] frames (see [`forward_updates`]).

mod codec;
mod message;
mod transport;

pub use codec::{decode_client, decode_server, encode_client, encode_server};
pub use message::{ClientMessage, ServerMessage, WireEvent};
pub use transport::{forward_updates, SessionTransport};
