//! High-level connection driver.
//!
//! [`Client`] bundles the endpoint URL, realm, serializer offer and
//! authenticators, and wires a [`Session`] to a live WebSocket in one
//! call: connect, attach, spawn the inbound pump, join. The returned
//! [`Connection`] resolves to an [`ExitInfo`] when the underlying
//! connection ends.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wamp::auth::AnonymousAuth;
//! use wamp::client::Client;
//! use wamp::protocol::Session;
//!
//! # async fn run() -> wamp::error::Result<()> {
//! let session = Session::new();
//! let client = Client::new("ws://localhost:8080/ws", "realm1")
//!     .with_authenticator(Arc::new(AnonymousAuth::new()));
//! let connection = client.connect(&session).await?;
//! tracing::info!(session_id = connection.details.session_id, "joined");
//! let exit = connection.closed().await;
//! tracing::info!(was_clean = exit.was_clean, "connection ended");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::Authenticator;
use crate::error::{Result, WampError};
use crate::protocol::session::Session;
use crate::protocol::types::{ExitInfo, SessionDetails};
use crate::serializer::{self, Serializer};
use crate::transport::{Transport, WebSocketOptions, WebSocketTransport};

/// Default subprotocol offer, most compact format first.
const DEFAULT_SERIALIZERS: [&str; 3] = ["wamp.2.cbor", "wamp.2.msgpack", "wamp.2.json"];

/// Connection configuration and one-call connect driver.
pub struct Client {
    url: String,
    realm: String,
    serializers: Vec<&'static str>,
    authenticators: Vec<Arc<dyn Authenticator>>,
    options: WebSocketOptions,
}

impl Client {
    /// A client for `realm` at the given WebSocket URL, offering all
    /// built-in serializers and no authenticators.
    pub fn new(url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            serializers: DEFAULT_SERIALIZERS.to_vec(),
            authenticators: Vec::new(),
            options: WebSocketOptions::default(),
        }
    }

    /// Replace the serializer offer. Order is preference order; names
    /// are subprotocol identifiers such as `wamp.2.json`.
    pub fn with_serializers(mut self, names: Vec<&'static str>) -> Self {
        self.serializers = names;
        self
    }

    /// Add an authenticator to offer during session establishment.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    /// Override the WebSocket transport options.
    pub fn with_options(mut self, options: WebSocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect, attach the session, spawn the inbound pump and join the
    /// realm. Resolves once WELCOME arrives; any failure along the way
    /// tears the connection down before returning.
    pub async fn connect(&self, session: &Session) -> Result<Connection> {
        let serializers = self
            .serializers
            .iter()
            .copied()
            .map(|name| {
                serializer::for_subprotocol(name)
                    .ok_or_else(|| WampError::Config(format!("unknown serializer {name:?}")))
            })
            .collect::<Result<Vec<Box<dyn Serializer>>>>()?;

        let (transport, connection) =
            WebSocketTransport::connect(&self.url, serializers, &self.options).await?;
        session.attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)?;

        let pump_session = session.clone();
        let driver = tokio::spawn(async move { connection.run(&pump_session).await });

        let join = session.join(&self.realm, self.authenticators.clone());
        match join.await {
            Ok(details) => {
                info!(
                    realm = %details.realm,
                    session_id = details.session_id,
                    "session joined"
                );
                Ok(Connection { details, driver })
            }
            Err(err) => {
                let _ = transport.abort();
                // The pump notices the closed socket and finishes the
                // session teardown.
                let _ = driver.await;
                Err(err)
            }
        }
    }
}

/// A live, joined connection.
pub struct Connection {
    /// Realm and session id granted by the WELCOME.
    pub details: SessionDetails,
    driver: JoinHandle<ExitInfo>,
}

impl Connection {
    /// Wait for the connection to end.
    pub async fn closed(self) -> ExitInfo {
        self.driver.await.unwrap_or(ExitInfo { was_clean: false })
    }
}
