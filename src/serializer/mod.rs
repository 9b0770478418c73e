//! Pluggable wire serializers.
//!
//! Every message marshals to a neutral value tree (one array per
//! message, type tag first); a [`Serializer`] turns that tree into
//! bytes and back. The three built-ins cover the standard WAMP
//! WebSocket subprotocols:
//!
//! | Serializer | Subprotocol       | Framing |
//! |------------|-------------------|---------|
//! | [`JsonSerializer`]    | `wamp.2.json`    | text    |
//! | [`MsgPackSerializer`] | `wamp.2.msgpack` | binary  |
//! | [`CborSerializer`]    | `wamp.2.cbor`    | binary  |
//!
//! All three preserve request ids up to 2^53 - 1 exactly, so
//! correlation never depends on the negotiated format.

mod cbor;
mod json;
mod msgpack;

pub use cbor::CborSerializer;
pub use json::JsonSerializer;
pub use msgpack::MsgPackSerializer;

use crate::error::Result;
use crate::protocol::message::Message;

/// Encodes and decodes whole protocol messages.
///
/// Implementations must be stateless: the same serializer instance is
/// shared by the reader and writer halves of a transport.
pub trait Serializer: Send + Sync {
    /// WebSocket subprotocol identifier, e.g. `wamp.2.json`.
    fn name(&self) -> &'static str;

    /// Whether encoded messages travel in binary frames.
    fn is_binary(&self) -> bool;

    /// Encode one message.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>>;

    /// Decode one message from a complete frame payload.
    fn deserialize(&self, bytes: &[u8]) -> Result<Message>;
}

/// Pick the serializer matching a negotiated subprotocol name.
pub fn for_subprotocol(name: &str) -> Option<Box<dyn Serializer>> {
    match name {
        "wamp.2.json" => Some(Box::new(JsonSerializer)),
        "wamp.2.msgpack" => Some(Box::new(MsgPackSerializer)),
        "wamp.2.cbor" => Some(Box::new(CborSerializer)),
        _ => None,
    }
}
