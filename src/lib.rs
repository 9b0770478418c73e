//! # WAMP Client - Session Protocol Engine
//!
//! WAMP client library: one session multiplexing RPC and pub/sub over a
//! WebSocket, with pluggable serializers and authentication methods.
//!
//! The crate is layered bottom-up:
//!
//! - [`protocol`]: the message set, request-id space and the
//!   [`Session`](protocol::Session) state machine with request/reply
//!   correlation.
//! - [`serializer`]: pluggable wire formats (JSON, MessagePack, CBOR).
//! - [`auth`]: authentication methods (anonymous, ticket, WAMP-CRA,
//!   cryptosign).
//! - [`transport`]: the transport seam and the built-in WebSocket
//!   client.
//! - [`client`]: a one-call driver tying a session to a live
//!   connection.
//!
//! A session is transport-agnostic: it consumes an ordered stream of
//! decoded messages and emits messages through the
//! [`Transport`](transport::Transport) trait. Applications either use
//! [`client::Client`] for the common WebSocket case or drive the
//! session against their own transport.

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod serializer;
pub mod transport;

pub use client::{Client, Connection};
pub use error::{Result, WampError};
pub use protocol::{endpoint_fn, event_fn, Message, ReplyFuture, Session, SessionState};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
