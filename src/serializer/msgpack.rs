//! MessagePack serializer (`wamp.2.msgpack`, binary frames).

use serde_json::Value;

use super::Serializer;
use crate::error::{Result, WampError};
use crate::protocol::message::Message;

/// The MessagePack wire format. Compact binary frames; integers up to
/// 2^53 - 1 round-trip exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

impl Serializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "wamp.2.msgpack"
    }

    fn is_binary(&self) -> bool {
        true
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        rmp_serde::to_vec(&message.marshal())
            .map_err(|err| WampError::Serialization(format!("msgpack encode failed: {err}")))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let wmsg: Vec<Value> = rmp_serde::from_slice(bytes)
            .map_err(|err| WampError::Serialization(format!("invalid msgpack frame: {err}")))?;
        Message::parse(&wmsg)
    }
}
