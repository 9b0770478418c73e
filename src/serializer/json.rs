//! JSON serializer (`wamp.2.json`, text frames).

use serde_json::Value;

use super::Serializer;
use crate::error::{Result, WampError};
use crate::protocol::message::Message;

/// The JSON wire format. Human-readable, text frames; the default when
/// the server offers no binary subprotocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "wamp.2.json"
    }

    fn is_binary(&self) -> bool {
        false
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&message.marshal())?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let wmsg: Vec<Value> = serde_json::from_slice(bytes)
            .map_err(|err| WampError::Serialization(format!("invalid JSON frame: {err}")))?;
        Message::parse(&wmsg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::MSG_HELLO;
    use serde_json::json;

    #[test]
    fn test_hello_wire_shape() {
        let message = Message::Hello {
            realm: "realm1".into(),
            details: serde_json::Map::new(),
        };
        let bytes = JsonSerializer.serialize(&message).unwrap();
        let wire: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire[0], json!(MSG_HELLO));
        assert_eq!(wire[1], json!("realm1"));
    }

    #[test]
    fn test_rejects_non_array_frame() {
        let err = JsonSerializer.deserialize(b"{\"not\":\"an array\"}").unwrap_err();
        assert!(matches!(err, WampError::Serialization(_)));
    }
}
