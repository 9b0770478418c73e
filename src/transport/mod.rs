//! Transport boundary for WAMP sessions.
//!
//! The session consumes a message-oriented, ordered, loss-free channel
//! through the [`Transport`] trait and performs no reconnect logic of
//! its own. A transport implementation owns the wire handshake, frame
//! codec and the negotiated [`Serializer`](crate::serializer::Serializer);
//! it delivers exactly one decoded [`Message`] per logical frame to the
//! session and accepts outbound messages concurrently with inbound
//! delivery.
//!
//! [`websocket`] provides the built-in tokio-tungstenite client.

mod websocket;

pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::time::Duration;

use crate::error::Result;
use crate::protocol::message::Message;

/// Outbound half of a connected transport, as seen by the session.
///
/// `send` must preserve ordering across concurrent callers and must not
/// block: implementations enqueue and let a writer task drain.
pub trait Transport: Send + Sync {
    /// Queue one protocol message for delivery to the peer.
    fn send(&self, message: Message) -> Result<()>;

    /// Whether the underlying connection is still open.
    fn is_open(&self) -> bool;

    /// Close gracefully (finish queued writes, send a close frame).
    fn close(&self) -> Result<()>;

    /// Drop the connection immediately, discarding queued writes.
    fn abort(&self) -> Result<()>;
}

/// Options for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketOptions {
    /// Give up on the TCP/WebSocket handshake after this long.
    pub connect_timeout: Duration,
    /// Log every raw frame at debug level.
    pub debug_frames: bool,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            debug_frames: false,
        }
    }
}
