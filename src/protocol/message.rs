//! Typed WAMP wire messages.
//!
//! Every message travels as one array whose first element is an integer
//! message-type tag. [`Message::marshal`] produces that array as a
//! `serde_json::Value` tree and [`Message::parse`] reverses it with
//! per-type element-count validation. Serializers turn the tree into
//! concrete wire bytes; nothing outside this module and the serializers
//! knows the wire shape.
//!
//! Positional (`args`) and keyword (`kwargs`) payloads are trailing
//! optional elements: empty payloads are omitted on the wire, and an
//! empty `args` list is emitted as a placeholder whenever `kwargs` is
//! present.

use serde_json::Value;

use super::types::{Args, Kwargs};
use crate::error::{Result, WampError};

/// HELLO message type tag.
pub const MSG_HELLO: u64 = 1;
/// WELCOME message type tag.
pub const MSG_WELCOME: u64 = 2;
/// ABORT message type tag.
pub const MSG_ABORT: u64 = 3;
/// CHALLENGE message type tag.
pub const MSG_CHALLENGE: u64 = 4;
/// AUTHENTICATE message type tag.
pub const MSG_AUTHENTICATE: u64 = 5;
/// GOODBYE message type tag.
pub const MSG_GOODBYE: u64 = 6;
/// ERROR message type tag.
pub const MSG_ERROR: u64 = 8;
/// PUBLISH message type tag.
pub const MSG_PUBLISH: u64 = 16;
/// PUBLISHED message type tag.
pub const MSG_PUBLISHED: u64 = 17;
/// SUBSCRIBE message type tag.
pub const MSG_SUBSCRIBE: u64 = 32;
/// SUBSCRIBED message type tag.
pub const MSG_SUBSCRIBED: u64 = 33;
/// UNSUBSCRIBE message type tag.
pub const MSG_UNSUBSCRIBE: u64 = 34;
/// UNSUBSCRIBED message type tag.
pub const MSG_UNSUBSCRIBED: u64 = 35;
/// EVENT message type tag.
pub const MSG_EVENT: u64 = 36;
/// CALL message type tag.
pub const MSG_CALL: u64 = 48;
/// RESULT message type tag.
pub const MSG_RESULT: u64 = 50;
/// REGISTER message type tag.
pub const MSG_REGISTER: u64 = 64;
/// REGISTERED message type tag.
pub const MSG_REGISTERED: u64 = 65;
/// UNREGISTER message type tag.
pub const MSG_UNREGISTER: u64 = 66;
/// UNREGISTERED message type tag.
pub const MSG_UNREGISTERED: u64 = 67;
/// INVOCATION message type tag.
pub const MSG_INVOCATION: u64 = 68;
/// YIELD message type tag.
pub const MSG_YIELD: u64 = 70;

/// Tagged union of all WAMP wire message kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Session join request: `[1, realm, details]`
    Hello {
        /// Realm to join.
        realm: String,
        /// Roles, authmethods, authid, authextra.
        details: Kwargs,
    },
    /// Session established: `[2, session_id, details]`
    Welcome {
        /// Session id assigned by the peer.
        session_id: u64,
        /// Peer capabilities.
        details: Kwargs,
    },
    /// Join refused before session establishment: `[3, details, reason]`
    Abort {
        /// Abort details (`message`, ...).
        details: Kwargs,
        /// Abort reason URI.
        reason: String,
    },
    /// Authentication challenge: `[4, method, extra]`
    Challenge {
        /// Selected authentication method.
        method: String,
        /// Method-specific data.
        extra: Kwargs,
    },
    /// Challenge response: `[5, signature, extra]`
    Authenticate {
        /// Computed signature/proof.
        signature: String,
        /// Extra response data.
        extra: Kwargs,
    },
    /// Session leave: `[6, details, reason]`
    Goodbye {
        /// Goodbye details (`message`, ...).
        details: Kwargs,
        /// Goodbye reason URI.
        reason: String,
    },
    /// Request failure: `[8, request_type, request_id, details, error, args?, kwargs?]`
    Error {
        /// Message type tag of the failed request.
        request_type: u64,
        /// Id of the failed request.
        request_id: u64,
        /// Error details.
        details: Kwargs,
        /// Error URI.
        error: String,
        /// Positional error payload.
        args: Args,
        /// Keyword error payload.
        kwargs: Kwargs,
    },
    /// Publish request: `[16, request_id, options, topic, args?, kwargs?]`
    Publish {
        /// Request id.
        request_id: u64,
        /// Publish options.
        options: Kwargs,
        /// Topic URI.
        topic: String,
        /// Positional event payload.
        args: Args,
        /// Keyword event payload.
        kwargs: Kwargs,
    },
    /// Publish acknowledgement: `[17, request_id, publication_id]`
    Published {
        /// Id of the acknowledged PUBLISH.
        request_id: u64,
        /// Publication id.
        publication_id: u64,
    },
    /// Subscribe request: `[32, request_id, options, topic]`
    Subscribe {
        /// Request id.
        request_id: u64,
        /// Subscribe options.
        options: Kwargs,
        /// Topic URI.
        topic: String,
    },
    /// Subscribe acknowledgement: `[33, request_id, subscription_id]`
    Subscribed {
        /// Id of the acknowledged SUBSCRIBE.
        request_id: u64,
        /// Subscription id.
        subscription_id: u64,
    },
    /// Unsubscribe request: `[34, request_id, subscription_id]`
    Unsubscribe {
        /// Request id.
        request_id: u64,
        /// Subscription to drop.
        subscription_id: u64,
    },
    /// Unsubscribe acknowledgement: `[35, request_id]`
    Unsubscribed {
        /// Id of the acknowledged UNSUBSCRIBE.
        request_id: u64,
    },
    /// Event delivery: `[36, subscription_id, publication_id, details, args?, kwargs?]`
    Event {
        /// Subscription the event matches.
        subscription_id: u64,
        /// Publication id of the event.
        publication_id: u64,
        /// Event details (`topic`, ...).
        details: Kwargs,
        /// Positional event payload.
        args: Args,
        /// Keyword event payload.
        kwargs: Kwargs,
    },
    /// Call request: `[48, request_id, options, procedure, args?, kwargs?]`
    Call {
        /// Request id.
        request_id: u64,
        /// Call options.
        options: Kwargs,
        /// Procedure URI.
        procedure: String,
        /// Positional call payload.
        args: Args,
        /// Keyword call payload.
        kwargs: Kwargs,
    },
    /// Call result: `[50, request_id, details, args?, kwargs?]`
    Result {
        /// Id of the answered CALL.
        request_id: u64,
        /// Result details.
        details: Kwargs,
        /// Positional results.
        args: Args,
        /// Keyword results.
        kwargs: Kwargs,
    },
    /// Register request: `[64, request_id, options, procedure]`
    Register {
        /// Request id.
        request_id: u64,
        /// Register options.
        options: Kwargs,
        /// Procedure URI.
        procedure: String,
    },
    /// Register acknowledgement: `[65, request_id, registration_id]`
    Registered {
        /// Id of the acknowledged REGISTER.
        request_id: u64,
        /// Registration id.
        registration_id: u64,
    },
    /// Unregister request: `[66, request_id, registration_id]`
    Unregister {
        /// Request id.
        request_id: u64,
        /// Registration to drop.
        registration_id: u64,
    },
    /// Unregister acknowledgement: `[67, request_id]`
    Unregistered {
        /// Id of the acknowledged UNREGISTER.
        request_id: u64,
    },
    /// Invocation of a local endpoint: `[68, request_id, registration_id, details, args?, kwargs?]`
    Invocation {
        /// Invocation request id, echoed in YIELD/ERROR.
        request_id: u64,
        /// Registration being invoked.
        registration_id: u64,
        /// Invocation details.
        details: Kwargs,
        /// Positional call payload.
        args: Args,
        /// Keyword call payload.
        kwargs: Kwargs,
    },
    /// Invocation result: `[70, request_id, options, args?, kwargs?]`
    Yield {
        /// Id of the answered INVOCATION.
        request_id: u64,
        /// Yield options.
        options: Kwargs,
        /// Positional results.
        args: Args,
        /// Keyword results.
        kwargs: Kwargs,
    },
}

impl Message {
    /// Integer message-type tag of this message.
    pub fn message_type(&self) -> u64 {
        match self {
            Message::Hello { .. } => MSG_HELLO,
            Message::Welcome { .. } => MSG_WELCOME,
            Message::Abort { .. } => MSG_ABORT,
            Message::Challenge { .. } => MSG_CHALLENGE,
            Message::Authenticate { .. } => MSG_AUTHENTICATE,
            Message::Goodbye { .. } => MSG_GOODBYE,
            Message::Error { .. } => MSG_ERROR,
            Message::Publish { .. } => MSG_PUBLISH,
            Message::Published { .. } => MSG_PUBLISHED,
            Message::Subscribe { .. } => MSG_SUBSCRIBE,
            Message::Subscribed { .. } => MSG_SUBSCRIBED,
            Message::Unsubscribe { .. } => MSG_UNSUBSCRIBE,
            Message::Unsubscribed { .. } => MSG_UNSUBSCRIBED,
            Message::Event { .. } => MSG_EVENT,
            Message::Call { .. } => MSG_CALL,
            Message::Result { .. } => MSG_RESULT,
            Message::Register { .. } => MSG_REGISTER,
            Message::Registered { .. } => MSG_REGISTERED,
            Message::Unregister { .. } => MSG_UNREGISTER,
            Message::Unregistered { .. } => MSG_UNREGISTERED,
            Message::Invocation { .. } => MSG_INVOCATION,
            Message::Yield { .. } => MSG_YIELD,
        }
    }

    /// Protocol name of this message, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::Welcome { .. } => "WELCOME",
            Message::Abort { .. } => "ABORT",
            Message::Challenge { .. } => "CHALLENGE",
            Message::Authenticate { .. } => "AUTHENTICATE",
            Message::Goodbye { .. } => "GOODBYE",
            Message::Error { .. } => "ERROR",
            Message::Publish { .. } => "PUBLISH",
            Message::Published { .. } => "PUBLISHED",
            Message::Subscribe { .. } => "SUBSCRIBE",
            Message::Subscribed { .. } => "SUBSCRIBED",
            Message::Unsubscribe { .. } => "UNSUBSCRIBE",
            Message::Unsubscribed { .. } => "UNSUBSCRIBED",
            Message::Event { .. } => "EVENT",
            Message::Call { .. } => "CALL",
            Message::Result { .. } => "RESULT",
            Message::Register { .. } => "REGISTER",
            Message::Registered { .. } => "REGISTERED",
            Message::Unregister { .. } => "UNREGISTER",
            Message::Unregistered { .. } => "UNREGISTERED",
            Message::Invocation { .. } => "INVOCATION",
            Message::Yield { .. } => "YIELD",
        }
    }

    /// Marshal into the wire array.
    pub fn marshal(&self) -> Vec<Value> {
        match self {
            Message::Hello { realm, details } => {
                vec![
                    Value::from(MSG_HELLO),
                    Value::from(realm.clone()),
                    Value::Object(details.clone()),
                ]
            }
            Message::Welcome {
                session_id,
                details,
            } => vec![
                Value::from(MSG_WELCOME),
                Value::from(*session_id),
                Value::Object(details.clone()),
            ],
            Message::Abort { details, reason } => vec![
                Value::from(MSG_ABORT),
                Value::Object(details.clone()),
                Value::from(reason.clone()),
            ],
            Message::Challenge { method, extra } => vec![
                Value::from(MSG_CHALLENGE),
                Value::from(method.clone()),
                Value::Object(extra.clone()),
            ],
            Message::Authenticate { signature, extra } => vec![
                Value::from(MSG_AUTHENTICATE),
                Value::from(signature.clone()),
                Value::Object(extra.clone()),
            ],
            Message::Goodbye { details, reason } => vec![
                Value::from(MSG_GOODBYE),
                Value::Object(details.clone()),
                Value::from(reason.clone()),
            ],
            Message::Error {
                request_type,
                request_id,
                details,
                error,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_ERROR),
                    Value::from(*request_type),
                    Value::from(*request_id),
                    Value::Object(details.clone()),
                    Value::from(error.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
            Message::Publish {
                request_id,
                options,
                topic,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_PUBLISH),
                    Value::from(*request_id),
                    Value::Object(options.clone()),
                    Value::from(topic.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
            Message::Published {
                request_id,
                publication_id,
            } => vec![
                Value::from(MSG_PUBLISHED),
                Value::from(*request_id),
                Value::from(*publication_id),
            ],
            Message::Subscribe {
                request_id,
                options,
                topic,
            } => vec![
                Value::from(MSG_SUBSCRIBE),
                Value::from(*request_id),
                Value::Object(options.clone()),
                Value::from(topic.clone()),
            ],
            Message::Subscribed {
                request_id,
                subscription_id,
            } => vec![
                Value::from(MSG_SUBSCRIBED),
                Value::from(*request_id),
                Value::from(*subscription_id),
            ],
            Message::Unsubscribe {
                request_id,
                subscription_id,
            } => vec![
                Value::from(MSG_UNSUBSCRIBE),
                Value::from(*request_id),
                Value::from(*subscription_id),
            ],
            Message::Unsubscribed { request_id } => {
                vec![Value::from(MSG_UNSUBSCRIBED), Value::from(*request_id)]
            }
            Message::Event {
                subscription_id,
                publication_id,
                details,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_EVENT),
                    Value::from(*subscription_id),
                    Value::from(*publication_id),
                    Value::Object(details.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
            Message::Call {
                request_id,
                options,
                procedure,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_CALL),
                    Value::from(*request_id),
                    Value::Object(options.clone()),
                    Value::from(procedure.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
            Message::Result {
                request_id,
                details,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_RESULT),
                    Value::from(*request_id),
                    Value::Object(details.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
            Message::Register {
                request_id,
                options,
                procedure,
            } => vec![
                Value::from(MSG_REGISTER),
                Value::from(*request_id),
                Value::Object(options.clone()),
                Value::from(procedure.clone()),
            ],
            Message::Registered {
                request_id,
                registration_id,
            } => vec![
                Value::from(MSG_REGISTERED),
                Value::from(*request_id),
                Value::from(*registration_id),
            ],
            Message::Unregister {
                request_id,
                registration_id,
            } => vec![
                Value::from(MSG_UNREGISTER),
                Value::from(*request_id),
                Value::from(*registration_id),
            ],
            Message::Unregistered { request_id } => {
                vec![Value::from(MSG_UNREGISTERED), Value::from(*request_id)]
            }
            Message::Invocation {
                request_id,
                registration_id,
                details,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_INVOCATION),
                    Value::from(*request_id),
                    Value::from(*registration_id),
                    Value::Object(details.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
            Message::Yield {
                request_id,
                options,
                args,
                kwargs,
            } => {
                let mut wmsg = vec![
                    Value::from(MSG_YIELD),
                    Value::from(*request_id),
                    Value::Object(options.clone()),
                ];
                push_payload(&mut wmsg, args, kwargs);
                wmsg
            }
        }
    }

    /// Parse a wire array into a typed message.
    ///
    /// Validates the leading type tag and the per-type minimum and
    /// maximum element counts; any violation is a
    /// [`WampError::Protocol`], which the session treats as fatal.
    pub fn parse(wmsg: &[Value]) -> Result<Message> {
        let tag = wmsg
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| WampError::Protocol("message lacks integer type tag".into()))?;

        match tag {
            MSG_HELLO => {
                validate(wmsg, "HELLO", 3, 3)?;
                Ok(Message::Hello {
                    realm: parse_str(wmsg, 1, "HELLO", "realm")?,
                    details: parse_dict(wmsg, 2, "HELLO", "details")?,
                })
            }
            MSG_WELCOME => {
                validate(wmsg, "WELCOME", 3, 3)?;
                Ok(Message::Welcome {
                    session_id: parse_id(wmsg, 1, "WELCOME", "session")?,
                    details: parse_dict(wmsg, 2, "WELCOME", "details")?,
                })
            }
            MSG_ABORT => {
                validate(wmsg, "ABORT", 3, 3)?;
                Ok(Message::Abort {
                    details: parse_dict(wmsg, 1, "ABORT", "details")?,
                    reason: parse_str(wmsg, 2, "ABORT", "reason")?,
                })
            }
            MSG_CHALLENGE => {
                validate(wmsg, "CHALLENGE", 3, 3)?;
                Ok(Message::Challenge {
                    method: parse_str(wmsg, 1, "CHALLENGE", "method")?,
                    extra: parse_dict(wmsg, 2, "CHALLENGE", "extra")?,
                })
            }
            MSG_AUTHENTICATE => {
                validate(wmsg, "AUTHENTICATE", 3, 3)?;
                Ok(Message::Authenticate {
                    signature: parse_str(wmsg, 1, "AUTHENTICATE", "signature")?,
                    extra: parse_dict(wmsg, 2, "AUTHENTICATE", "extra")?,
                })
            }
            MSG_GOODBYE => {
                validate(wmsg, "GOODBYE", 3, 3)?;
                Ok(Message::Goodbye {
                    details: parse_dict(wmsg, 1, "GOODBYE", "details")?,
                    reason: parse_str(wmsg, 2, "GOODBYE", "reason")?,
                })
            }
            MSG_ERROR => {
                validate(wmsg, "ERROR", 5, 7)?;
                Ok(Message::Error {
                    request_type: parse_id(wmsg, 1, "ERROR", "request type")?,
                    request_id: parse_id(wmsg, 2, "ERROR", "request")?,
                    details: parse_dict(wmsg, 3, "ERROR", "details")?,
                    error: parse_str(wmsg, 4, "ERROR", "error")?,
                    args: parse_args(wmsg, 5, "ERROR")?,
                    kwargs: parse_kwargs(wmsg, 6, "ERROR")?,
                })
            }
            MSG_PUBLISH => {
                validate(wmsg, "PUBLISH", 4, 6)?;
                Ok(Message::Publish {
                    request_id: parse_id(wmsg, 1, "PUBLISH", "request")?,
                    options: parse_dict(wmsg, 2, "PUBLISH", "options")?,
                    topic: parse_str(wmsg, 3, "PUBLISH", "topic")?,
                    args: parse_args(wmsg, 4, "PUBLISH")?,
                    kwargs: parse_kwargs(wmsg, 5, "PUBLISH")?,
                })
            }
            MSG_PUBLISHED => {
                validate(wmsg, "PUBLISHED", 3, 3)?;
                Ok(Message::Published {
                    request_id: parse_id(wmsg, 1, "PUBLISHED", "request")?,
                    publication_id: parse_id(wmsg, 2, "PUBLISHED", "publication")?,
                })
            }
            MSG_SUBSCRIBE => {
                validate(wmsg, "SUBSCRIBE", 4, 4)?;
                Ok(Message::Subscribe {
                    request_id: parse_id(wmsg, 1, "SUBSCRIBE", "request")?,
                    options: parse_dict(wmsg, 2, "SUBSCRIBE", "options")?,
                    topic: parse_str(wmsg, 3, "SUBSCRIBE", "topic")?,
                })
            }
            MSG_SUBSCRIBED => {
                validate(wmsg, "SUBSCRIBED", 3, 3)?;
                Ok(Message::Subscribed {
                    request_id: parse_id(wmsg, 1, "SUBSCRIBED", "request")?,
                    subscription_id: parse_id(wmsg, 2, "SUBSCRIBED", "subscription")?,
                })
            }
            MSG_UNSUBSCRIBE => {
                validate(wmsg, "UNSUBSCRIBE", 3, 3)?;
                Ok(Message::Unsubscribe {
                    request_id: parse_id(wmsg, 1, "UNSUBSCRIBE", "request")?,
                    subscription_id: parse_id(wmsg, 2, "UNSUBSCRIBE", "subscription")?,
                })
            }
            MSG_UNSUBSCRIBED => {
                validate(wmsg, "UNSUBSCRIBED", 2, 2)?;
                Ok(Message::Unsubscribed {
                    request_id: parse_id(wmsg, 1, "UNSUBSCRIBED", "request")?,
                })
            }
            MSG_EVENT => {
                validate(wmsg, "EVENT", 4, 6)?;
                Ok(Message::Event {
                    subscription_id: parse_id(wmsg, 1, "EVENT", "subscription")?,
                    publication_id: parse_id(wmsg, 2, "EVENT", "publication")?,
                    details: parse_dict(wmsg, 3, "EVENT", "details")?,
                    args: parse_args(wmsg, 4, "EVENT")?,
                    kwargs: parse_kwargs(wmsg, 5, "EVENT")?,
                })
            }
            MSG_CALL => {
                validate(wmsg, "CALL", 4, 6)?;
                Ok(Message::Call {
                    request_id: parse_id(wmsg, 1, "CALL", "request")?,
                    options: parse_dict(wmsg, 2, "CALL", "options")?,
                    procedure: parse_str(wmsg, 3, "CALL", "procedure")?,
                    args: parse_args(wmsg, 4, "CALL")?,
                    kwargs: parse_kwargs(wmsg, 5, "CALL")?,
                })
            }
            MSG_RESULT => {
                validate(wmsg, "RESULT", 3, 5)?;
                Ok(Message::Result {
                    request_id: parse_id(wmsg, 1, "RESULT", "request")?,
                    details: parse_dict(wmsg, 2, "RESULT", "details")?,
                    args: parse_args(wmsg, 3, "RESULT")?,
                    kwargs: parse_kwargs(wmsg, 4, "RESULT")?,
                })
            }
            MSG_REGISTER => {
                validate(wmsg, "REGISTER", 4, 4)?;
                Ok(Message::Register {
                    request_id: parse_id(wmsg, 1, "REGISTER", "request")?,
                    options: parse_dict(wmsg, 2, "REGISTER", "options")?,
                    procedure: parse_str(wmsg, 3, "REGISTER", "procedure")?,
                })
            }
            MSG_REGISTERED => {
                validate(wmsg, "REGISTERED", 3, 3)?;
                Ok(Message::Registered {
                    request_id: parse_id(wmsg, 1, "REGISTERED", "request")?,
                    registration_id: parse_id(wmsg, 2, "REGISTERED", "registration")?,
                })
            }
            MSG_UNREGISTER => {
                validate(wmsg, "UNREGISTER", 3, 3)?;
                Ok(Message::Unregister {
                    request_id: parse_id(wmsg, 1, "UNREGISTER", "request")?,
                    registration_id: parse_id(wmsg, 2, "UNREGISTER", "registration")?,
                })
            }
            MSG_UNREGISTERED => {
                validate(wmsg, "UNREGISTERED", 2, 2)?;
                Ok(Message::Unregistered {
                    request_id: parse_id(wmsg, 1, "UNREGISTERED", "request")?,
                })
            }
            MSG_INVOCATION => {
                validate(wmsg, "INVOCATION", 4, 6)?;
                Ok(Message::Invocation {
                    request_id: parse_id(wmsg, 1, "INVOCATION", "request")?,
                    registration_id: parse_id(wmsg, 2, "INVOCATION", "registration")?,
                    details: parse_dict(wmsg, 3, "INVOCATION", "details")?,
                    args: parse_args(wmsg, 4, "INVOCATION")?,
                    kwargs: parse_kwargs(wmsg, 5, "INVOCATION")?,
                })
            }
            MSG_YIELD => {
                validate(wmsg, "YIELD", 3, 5)?;
                Ok(Message::Yield {
                    request_id: parse_id(wmsg, 1, "YIELD", "request")?,
                    options: parse_dict(wmsg, 2, "YIELD", "options")?,
                    args: parse_args(wmsg, 3, "YIELD")?,
                    kwargs: parse_kwargs(wmsg, 4, "YIELD")?,
                })
            }
            other => Err(WampError::Protocol(format!(
                "unknown message type tag {other}"
            ))),
        }
    }
}

/// Append args/kwargs as trailing wire elements.
///
/// Empty payloads are omitted, except that a non-empty kwargs forces an
/// (empty) args placeholder so positions stay fixed.
fn push_payload(wmsg: &mut Vec<Value>, args: &Args, kwargs: &Kwargs) {
    if !kwargs.is_empty() {
        wmsg.push(Value::Array(args.clone()));
        wmsg.push(Value::Object(kwargs.clone()));
    } else if !args.is_empty() {
        wmsg.push(Value::Array(args.clone()));
    }
}

fn validate(wmsg: &[Value], name: &str, min: usize, max: usize) -> Result<()> {
    if wmsg.len() < min || wmsg.len() > max {
        return Err(WampError::Protocol(format!(
            "invalid {name} message length {} (expected {min}..={max})",
            wmsg.len()
        )));
    }
    Ok(())
}

fn parse_id(wmsg: &[Value], index: usize, name: &str, field: &str) -> Result<u64> {
    wmsg[index].as_u64().ok_or_else(|| {
        WampError::Protocol(format!("{name} {field} id is not a non-negative integer"))
    })
}

fn parse_str(wmsg: &[Value], index: usize, name: &str, field: &str) -> Result<String> {
    wmsg[index]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| WampError::Protocol(format!("{name} {field} is not a string")))
}

fn parse_dict(wmsg: &[Value], index: usize, name: &str, field: &str) -> Result<Kwargs> {
    match &wmsg[index] {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(WampError::Protocol(format!(
            "{name} {field} is not a dict"
        ))),
    }
}

/// Optional trailing args element; absent decodes to an empty list.
fn parse_args(wmsg: &[Value], index: usize, name: &str) -> Result<Args> {
    match wmsg.get(index) {
        None => Ok(Args::new()),
        Some(Value::Array(list)) => Ok(list.clone()),
        Some(_) => Err(WampError::Protocol(format!("{name} args is not a list"))),
    }
}

/// Optional trailing kwargs element; absent decodes to an empty dict.
fn parse_kwargs(wmsg: &[Value], index: usize, name: &str) -> Result<Kwargs> {
    match wmsg.get(index) {
        None => Ok(Kwargs::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(WampError::Protocol(format!("{name} kwargs is not a dict"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_marshal_shape() {
        let mut details = Kwargs::new();
        details.insert("roles".into(), json!({"caller": {}}));
        let msg = Message::Hello {
            realm: "realm1".into(),
            details,
        };
        let wmsg = msg.marshal();
        assert_eq!(wmsg[0], json!(1));
        assert_eq!(wmsg[1], json!("realm1"));
        assert_eq!(wmsg.len(), 3);
    }

    #[test]
    fn test_call_omits_empty_payload() {
        let msg = Message::Call {
            request_id: 7,
            options: Kwargs::new(),
            procedure: "com.example.add".into(),
            args: Args::new(),
            kwargs: Kwargs::new(),
        };
        assert_eq!(msg.marshal().len(), 4);
    }

    #[test]
    fn test_call_kwargs_forces_args_placeholder() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("x".into(), json!(1));
        let msg = Message::Call {
            request_id: 7,
            options: Kwargs::new(),
            procedure: "com.example.add".into(),
            args: Args::new(),
            kwargs,
        };
        let wmsg = msg.marshal();
        assert_eq!(wmsg.len(), 6);
        assert_eq!(wmsg[4], json!([]));
    }

    #[test]
    fn test_parse_rejects_missing_tag() {
        let err = Message::parse(&[json!("CALL")]).unwrap_err();
        assert!(matches!(err, WampError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_tag() {
        let err = Message::parse(&[json!(99), json!(1)]).unwrap_err();
        assert!(matches!(err, WampError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_truncated_error() {
        // ERROR needs at least 5 elements.
        let wmsg = vec![json!(8), json!(48), json!(1), json!({})];
        assert!(Message::parse(&wmsg).is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_result() {
        let wmsg = vec![
            json!(50),
            json!(1),
            json!({}),
            json!([]),
            json!({}),
            json!("extra"),
        ];
        assert!(Message::parse(&wmsg).is_err());
    }

    #[test]
    fn test_result_roundtrip() {
        let msg = Message::Result {
            request_id: 42,
            details: Kwargs::new(),
            args: vec![json!("hi"), json!(23)],
            kwargs: Kwargs::new(),
        };
        let parsed = Message::parse(&msg.marshal()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_invocation_roundtrip_with_kwargs() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("name".into(), json!("wamp"));
        let msg = Message::Invocation {
            request_id: 1,
            registration_id: 2,
            details: Kwargs::new(),
            args: Args::new(),
            kwargs,
        };
        let parsed = Message::parse(&msg.marshal()).unwrap();
        assert_eq!(parsed, msg);
    }
}
