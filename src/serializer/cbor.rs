//! CBOR serializer (`wamp.2.cbor`, binary frames).

use serde_json::Value;

use super::Serializer;
use crate::error::{Result, WampError};
use crate::protocol::message::Message;

/// The CBOR wire format. Binary frames, self-describing like JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborSerializer;

impl Serializer for CborSerializer {
    fn name(&self) -> &'static str {
        "wamp.2.cbor"
    }

    fn is_binary(&self) -> bool {
        true
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        serde_cbor::to_vec(&message.marshal())
            .map_err(|err| WampError::Serialization(format!("cbor encode failed: {err}")))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let wmsg: Vec<Value> = serde_cbor::from_slice(bytes)
            .map_err(|err| WampError::Serialization(format!("invalid cbor frame: {err}")))?;
        Message::parse(&wmsg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_round_trips_with_kwargs() {
        let mut kwargs = serde_json::Map::new();
        kwargs.insert("unit".into(), json!("celsius"));
        let message = Message::Publish {
            request_id: 7,
            options: serde_json::Map::new(),
            topic: "com.example.temperature".into(),
            args: vec![json!(21.5)],
            kwargs,
        };
        let bytes = CborSerializer.serialize(&message).unwrap();
        let decoded = CborSerializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_rejects_garbage() {
        let err = CborSerializer.deserialize(&[0xff, 0x00, 0xff]).unwrap_err();
        assert!(matches!(err, WampError::Serialization(_)));
    }
}
