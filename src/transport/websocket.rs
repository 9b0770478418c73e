//! WebSocket client transport built on tokio-tungstenite.
//!
//! `connect` performs the WebSocket handshake, offering every
//! configured serializer's subprotocol in `Sec-WebSocket-Protocol` and
//! honoring whichever the server picks. The connected transport splits
//! into an outbound half ([`WebSocketTransport`], handed to the
//! session) and an inbound half ([`WebSocketConnection`], pumped by a
//! driver task). Outbound frames go through an unbounded queue drained
//! by a writer task, so `send` never blocks and ordering across
//! concurrent callers is the queue order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Transport, WebSocketOptions};
use crate::error::{Result, WampError};
use crate::protocol::message::Message;
use crate::protocol::session::Session;
use crate::protocol::types::ExitInfo;
use crate::serializer::Serializer;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum WriterCommand {
    Frame(WsMessage),
    Close,
}

/// Outbound half of a connected WebSocket transport.
pub struct WebSocketTransport {
    writer: mpsc::UnboundedSender<WriterCommand>,
    serializer: Arc<dyn Serializer>,
    open: AtomicBool,
}

impl WebSocketTransport {
    /// Connect to `url`, negotiating one of the offered serializers.
    ///
    /// Returns the outbound transport (attach it to a session) and the
    /// inbound connection (pump it with [`WebSocketConnection::run`]).
    pub async fn connect(
        url: &str,
        serializers: Vec<Box<dyn Serializer>>,
        options: &WebSocketOptions,
    ) -> Result<(Arc<WebSocketTransport>, WebSocketConnection)> {
        if serializers.is_empty() {
            return Err(WampError::Config("at least one serializer required".into()));
        }

        let mut request = url
            .into_client_request()
            .map_err(|err| WampError::Config(format!("invalid WebSocket URL: {err}")))?;
        let offered = serializers
            .iter()
            .map(|serializer| serializer.name())
            .collect::<Vec<_>>()
            .join(", ");
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&offered)
                .map_err(|err| WampError::Config(format!("bad subprotocol list: {err}")))?,
        );

        let (stream, response) =
            tokio::time::timeout(options.connect_timeout, connect_async(request))
                .await
                .map_err(|_| WampError::Transport("WebSocket handshake timed out".into()))?
                .map_err(|err| WampError::Transport(format!("WebSocket connect failed: {err}")))?;

        let negotiated = response
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut serializers: Vec<Arc<dyn Serializer>> =
            serializers.into_iter().map(Arc::from).collect();
        let serializer = match &negotiated {
            Some(name) => serializers
                .iter()
                .find(|serializer| serializer.name() == name)
                .cloned()
                .ok_or_else(|| {
                    WampError::Transport(format!("server picked unoffered subprotocol {name:?}"))
                })?,
            // Some servers omit the header; they speak our first offer.
            None => serializers.remove(0),
        };
        debug!(subprotocol = serializer.name(), "WebSocket connected");

        let (sink, stream) = stream.split();
        let (writer, commands) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(sink, commands));

        let transport = Arc::new(WebSocketTransport {
            writer,
            serializer: Arc::clone(&serializer),
            open: AtomicBool::new(true),
        });
        let connection = WebSocketConnection {
            stream,
            serializer,
            transport: Arc::clone(&transport),
            debug_frames: options.debug_frames,
        };
        Ok((transport, connection))
    }

    fn enqueue(&self, command: WriterCommand) -> Result<()> {
        self.writer
            .send(command)
            .map_err(|_| WampError::Transport("connection closed".into()))
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(WampError::Transport("connection closed".into()));
        }
        let payload = self.serializer.serialize(&message)?;
        let frame = if self.serializer.is_binary() {
            WsMessage::Binary(payload)
        } else {
            let text = String::from_utf8(payload)
                .map_err(|err| WampError::Serialization(format!("non-UTF-8 text frame: {err}")))?;
            WsMessage::Text(text)
        };
        self.enqueue(WriterCommand::Frame(frame))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.enqueue(WriterCommand::Close)?;
        }
        Ok(())
    }

    fn abort(&self) -> Result<()> {
        // Same wire behavior as close; queued frames ahead of the close
        // command are already committed to the writer.
        self.close()
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Frame(frame) => {
                if let Err(err) = sink.send(frame).await {
                    warn!(error = %err, "WebSocket write failed");
                    break;
                }
            }
            WriterCommand::Close => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}

/// Inbound half of a connected WebSocket transport.
pub struct WebSocketConnection {
    stream: SplitStream<WsStream>,
    serializer: Arc<dyn Serializer>,
    transport: Arc<WebSocketTransport>,
    debug_frames: bool,
}

impl WebSocketConnection {
    /// Pump inbound frames into the session until the connection ends.
    ///
    /// Decoded messages are delivered in arrival order. Returns whether
    /// the connection closed cleanly (close frame or orderly EOF) and
    /// always leaves the session disconnected.
    pub async fn run(mut self, session: &Session) -> ExitInfo {
        let was_clean = loop {
            let frame = match self.stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    warn!(error = %err, "WebSocket read failed");
                    break false;
                }
                None => break true,
            };
            if self.debug_frames {
                debug!(?frame, "RX frame");
            }
            let payload = match frame {
                WsMessage::Text(text) => text.into_bytes(),
                WsMessage::Binary(bytes) => bytes,
                WsMessage::Close(_) => break true,
                // Pings are answered by tungstenite internally.
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            };
            match self.serializer.deserialize(&payload) {
                Ok(message) => session.handle_message(message).await,
                Err(err) => {
                    // Framing can no longer be trusted past a bad frame.
                    warn!(error = %err, "dropping connection on undecodable frame");
                    let _ = self.transport.abort();
                    break false;
                }
            }
        };
        self.transport.open.store(false, Ordering::SeqCst);
        session.handle_disconnect(was_clean);
        ExitInfo { was_clean }
    }
}
