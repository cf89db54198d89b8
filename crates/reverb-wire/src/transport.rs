//! Transport traits for session delivery
//!
//! The engine is transport-agnostic: one event in, one or more updates
//! out, associated by token. Implementations wrap whatever duplex channel
//! the deployment uses (WebSocket, long-poll, an in-process pair in
//! tests) behind [`SessionTransport`].

use crate::message::ServerMessage;
use reverb_core::Update;
use tokio::sync::mpsc::UnboundedReceiver;

/// Outbound half of one session's duplex channel
pub trait SessionTransport: Send + Sync {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transmit one frame to the client
    fn deliver(&self, message: &ServerMessage) -> Result<(), Self::Error>;

    /// Check if the client is still reachable
    fn is_connected(&self) -> bool;

    /// Close the channel gracefully
    fn close(&self) -> Result<(), Self::Error>;
}

/// Pump a session's updates into a transport until the session ends
///
/// Converts each engine [`Update`] into its wire frame. Returns when the
/// engine retires the session (channel closed) or the transport reports
/// the client gone; delivery errors propagate so the caller can trigger
/// session teardown.
pub async fn forward_updates<T: SessionTransport>(
    mut updates: UnboundedReceiver<Update>,
    transport: &T,
) -> Result<(), T::Error> {
    while let Some(update) = updates.recv().await {
        if !transport.is_connected() {
            break;
        }
        transport.deliver(&ServerMessage::from(update))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reverb_core::{ClientEvent, Delta, Update};
    use tokio::sync::mpsc;

    #[derive(Debug, thiserror::Error)]
    #[error("disconnected")]
    struct Disconnected;

    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<ServerMessage>>,
        connected: Mutex<bool>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                frames: Mutex::new(Vec::new()),
                connected: Mutex::new(true),
            }
        }
    }

    impl SessionTransport for RecordingTransport {
        type Error = Disconnected;

        fn deliver(&self, message: &ServerMessage) -> Result<(), Disconnected> {
            if !*self.connected.lock() {
                return Err(Disconnected);
            }
            self.frames.lock().push(message.clone());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            *self.connected.lock()
        }

        fn close(&self) -> Result<(), Disconnected> {
            *self.connected.lock() = false;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forward_until_channel_closes() {
        let transport = RecordingTransport::new();
        let (sender, receiver) = mpsc::unbounded_channel();

        sender.send(Update::delta(Delta::new())).unwrap();
        sender
            .send(Update::diagnostics(vec![ClientEvent::new("handler_error")]))
            .unwrap();
        drop(sender);

        forward_updates(receiver, &transport).await.unwrap();
        assert_eq!(transport.frames.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_forward_stops_when_disconnected() {
        let transport = RecordingTransport::new();
        transport.close().unwrap();
        let (sender, receiver) = mpsc::unbounded_channel();
        sender.send(Update::delta(Delta::new())).unwrap();
        drop(sender);

        forward_updates(receiver, &transport).await.unwrap();
        assert!(transport.frames.lock().is_empty());
    }
}
