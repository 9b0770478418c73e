//! WAMP client error types.
//!
//! The taxonomy separates errors that are fatal to the connection
//! (`Protocol`, `Transport`) from errors scoped to a single request
//! (`Application`) or to a single connect attempt (`Authentication`).
//! Session teardown resolves every outstanding request with
//! `SessionClosed`.

use thiserror::Error;

use crate::protocol::types::{Args, Kwargs};

/// WAMP client errors.
#[derive(Error, Debug)]
pub enum WampError {
    /// Malformed or out-of-sequence wire message. Fatal to the
    /// connection: the session aborts and disconnects because framing
    /// can no longer be trusted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer-reported error for a specific request. Resolves that
    /// request's outcome as a failure and is non-fatal to the session.
    #[error("Application error: {uri}")]
    Application {
        /// WAMP error URI, e.g. `wamp.error.no_such_procedure`.
        uri: String,
        /// Positional error payload.
        args: Args,
        /// Keyword error payload.
        kwargs: Kwargs,
    },

    /// Authentication negotiation failed: the server requested a method
    /// with no configured authenticator, or the authenticator itself
    /// failed. Fatal to the connect attempt, not to future attempts.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport connect failure or unexpected disconnect.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session tore down while the request was outstanding.
    #[error("Session closed")]
    SessionClosed,

    /// Operation requires a joined session.
    #[error("Session not joined")]
    NotJoined,

    /// Wire encoding or decoding failed for the negotiated serializer.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A local procedure endpoint failed during dispatch. Converted at
    /// the dispatch boundary into an ERROR reply to the peer.
    #[error("Invocation error: {0}")]
    Invocation(String),

    /// Invalid configuration (bad key material, malformed URL, ...).
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WampError {
    /// Build a [`WampError::Application`] from an error URI alone.
    pub fn application(uri: impl Into<String>) -> Self {
        WampError::Application {
            uri: uri.into(),
            args: Args::new(),
            kwargs: Kwargs::new(),
        }
    }

    /// Build a [`WampError::Application`] with payloads.
    pub fn application_with(uri: impl Into<String>, args: Args, kwargs: Kwargs) -> Self {
        WampError::Application {
            uri: uri.into(),
            args,
            kwargs,
        }
    }

    /// The WAMP error URI carried by this error, if any.
    pub fn uri(&self) -> Option<&str> {
        match self {
            WampError::Application { uri, .. } => Some(uri),
            _ => None,
        }
    }
}

/// Result type alias for WAMP operations
pub type Result<T> = std::result::Result<T, WampError>;

impl From<hex::FromHexError> for WampError {
    fn from(err: hex::FromHexError) -> Self {
        WampError::Config(format!("Hex decode error: {err}"))
    }
}

impl From<base64::DecodeError> for WampError {
    fn from(err: base64::DecodeError) -> Self {
        WampError::Serialization(format!("Base64 decode error: {err}"))
    }
}
