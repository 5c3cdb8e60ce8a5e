//! Boundary to the network layer
//!
//! The session never does I/O itself. Outbound messages go through a
//! [`Transport`]; inbound messages are handed to the session by whoever owns
//! the socket.

use crate::protocol::OutboundMessage;

/// Sink for outbound messages
///
/// Sending is fire-and-forget: delivery failures surface as a disconnect
/// reported by the transport's owner, not as an error here.
pub trait Transport: Send {
    fn send_outbound(&mut self, message: OutboundMessage);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_outbound(&mut self, message: OutboundMessage) {
        (**self).send_outbound(message)
    }
}

/// Collects messages in memory
impl Transport for Vec<OutboundMessage> {
    fn send_outbound(&mut self, message: OutboundMessage) {
        self.push(message);
    }
}

#[cfg(feature = "actor")]
pub use channel::ChannelTransport;

#[cfg(feature = "actor")]
mod channel {
    use super::Transport;
    use crate::protocol::OutboundMessage;
    use tokio::sync::mpsc;
    use tracing::warn;

    /// Forwards outbound messages into a tokio channel
    #[derive(Debug, Clone)]
    pub struct ChannelTransport {
        tx: mpsc::UnboundedSender<OutboundMessage>,
    }

    impl ChannelTransport {
        /// A transport and the receiving end the network task drains
        pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { tx }, rx)
        }
    }

    impl Transport for ChannelTransport {
        fn send_outbound(&mut self, message: OutboundMessage) {
            if let Err(e) = self.tx.send(message) {
                warn!(kind = e.0.kind(), "outbound channel closed, dropping message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_transport_collects() {
        let mut sink: Vec<OutboundMessage> = Vec::new();
        sink.send_outbound(OutboundMessage::ChatMessage { text: "hi".into() });
        assert_eq!(sink.len(), 1);
    }

    #[cfg(feature = "actor")]
    #[test]
    fn test_channel_transport_forwards() {
        let (mut transport, mut rx) = ChannelTransport::new();
        transport.send_outbound(OutboundMessage::ChatMessage { text: "hi".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundMessage::ChatMessage { text: "hi".into() }
        );

        drop(rx);
        // Closed receiver: dropped with a warning, no panic
        transport.send_outbound(OutboundMessage::ChatMessage { text: "lost".into() });
    }
}
