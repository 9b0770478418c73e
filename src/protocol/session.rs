//! Session state machine and request/reply correlation.
//!
//! One [`Session`] multiplexes remote procedure calls and topic
//! publish/subscribe over a single transport. All state mutation goes
//! through one mutex: the transport's inbound delivery and the
//! application's outbound calls may run on different tasks, but state
//! transitions, correlation-table changes and handler lookup are
//! serialized.
//!
//! Every operation that awaits a peer reply allocates a fresh request
//! id, parks a [`Pending`] entry keyed by that id and hands the caller
//! a [`ReplyFuture`] immediately. The matching reply resolves the
//! future from the inbound path; transport loss fails every
//! outstanding future with [`WampError::SessionClosed`] in one sweep.
//!
//! ```text
//!                 attach_transport() + join()
//!  [Disconnected] ──────────────────────────> [HelloSent]
//!        ^                                      │      │ CHALLENGE/AUTHENTICATE
//!        │ transport loss (any state)           │      v
//!        │                              WELCOME │  [AuthenticateSent]
//!        │                                      v      │ WELCOME
//!        │                              [Joined]─[Ready] <┘
//!        │                                         │ leave()
//!        │                                         v
//!        │          GOODBYE reply          [GoodbyeSent]
//!  [DisconnectedResumable] <───────────────────────┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::handler::{EventHandler, InvocationHandler};
use super::id::IdGenerator;
use super::message::{
    Message, MSG_CALL, MSG_INVOCATION, MSG_PUBLISH, MSG_REGISTER, MSG_SUBSCRIBE, MSG_UNREGISTER,
    MSG_UNSUBSCRIBE,
};
use super::types::{
    Args, CallOptions, CallResult, Challenge, CloseDetails, EventDetails, InvocationDetails,
    Kwargs, Publication, PublishOptions, RegisterOptions, Registration, SessionDetails,
    SubscribeOptions, Subscription,
};
use crate::auth::Authenticator;
use crate::error::{Result, WampError};
use crate::transport::Transport;

/// Goodbye reason for a locally initiated, ordinary leave.
pub const CLOSE_NORMAL: &str = "wamp.close.normal";
/// Goodbye reason acknowledging a peer-initiated goodbye.
pub const CLOSE_GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";
/// Error URI sent when an invocation targets an unknown registration.
pub const ERROR_NO_SUCH_REGISTRATION: &str = "wamp.error.no_such_registration";
/// Error URI for subscriptions the session does not hold.
pub const ERROR_NO_SUCH_SUBSCRIPTION: &str = "wamp.error.no_such_subscription";
/// Error URI sent when a local endpoint fails without a WAMP error URI.
pub const ERROR_RUNTIME: &str = "wamp.error.runtime_error";

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempt in progress.
    Disconnected,
    /// HELLO sent, waiting for WELCOME, CHALLENGE or ABORT.
    HelloSent,
    /// AUTHENTICATE sent, waiting for WELCOME or ABORT.
    AuthenticateSent,
    /// WELCOME received; join callbacks firing.
    Joined,
    /// Joined and fully usable.
    Ready,
    /// GOODBYE sent, waiting for the peer's goodbye or transport close.
    GoodbyeSent,
    /// GOODBYE exchange completed, transport close still outstanding.
    DisconnectedResumable,
}

/// Outcome handle for an in-flight request.
///
/// Resolves exactly once: with the reply payload, with the peer's
/// error, or with [`WampError::SessionClosed`] when the session tears
/// down first. Dropping the future abandons the outcome; the pending
/// entry stays until a reply arrives or the session ends.
pub struct ReplyFuture<T> {
    rx: Option<oneshot::Receiver<Result<T>>>,
    ready: Option<Result<T>>,
}

impl<T> ReplyFuture<T> {
    fn pending() -> (Self, oneshot::Sender<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                rx: Some(rx),
                ready: None,
            },
            tx,
        )
    }

    fn resolved(result: Result<T>) -> Self {
        Self {
            rx: None,
            ready: Some(result),
        }
    }
}

impl<T> Future for ReplyFuture<T>
where
    T: Unpin,
{
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.ready.take() {
            return Poll::Ready(result);
        }
        let rx = self
            .rx
            .as_mut()
            .expect("ReplyFuture polled after completion");
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a reply: session tore down.
            Poll::Ready(Err(_)) => Poll::Ready(Err(WampError::SessionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One outstanding request awaiting its correlated reply.
enum Pending {
    Call {
        reply: oneshot::Sender<Result<CallResult>>,
    },
    Register {
        reply: oneshot::Sender<Result<Registration>>,
        procedure: String,
        endpoint: Arc<dyn InvocationHandler>,
    },
    Subscribe {
        reply: oneshot::Sender<Result<Subscription>>,
        topic: String,
        handler: Arc<dyn EventHandler>,
    },
    Publish {
        reply: oneshot::Sender<Result<Option<Publication>>>,
    },
    Unregister {
        reply: oneshot::Sender<Result<()>>,
        registration_id: u64,
    },
    Unsubscribe {
        reply: oneshot::Sender<Result<()>>,
        subscription_id: u64,
    },
}

impl Pending {
    /// Message type tag of the request this entry belongs to, used to
    /// cross-check inbound ERROR messages.
    fn request_type(&self) -> u64 {
        match self {
            Pending::Call { .. } => MSG_CALL,
            Pending::Register { .. } => MSG_REGISTER,
            Pending::Subscribe { .. } => MSG_SUBSCRIBE,
            Pending::Publish { .. } => MSG_PUBLISH,
            Pending::Unregister { .. } => MSG_UNREGISTER,
            Pending::Unsubscribe { .. } => MSG_UNSUBSCRIBE,
        }
    }

    fn fail(self, err: WampError) {
        match self {
            Pending::Call { reply } => drop(reply.send(Err(err))),
            Pending::Register { reply, .. } => drop(reply.send(Err(err))),
            Pending::Subscribe { reply, .. } => drop(reply.send(Err(err))),
            Pending::Publish { reply } => drop(reply.send(Err(err))),
            Pending::Unregister { reply, .. } => drop(reply.send(Err(err))),
            Pending::Unsubscribe { reply, .. } => drop(reply.send(Err(err))),
        }
    }
}

/// A procedure endpoint held in the local registration registry.
struct LocalRegistration {
    procedure: String,
    endpoint: Arc<dyn InvocationHandler>,
}

/// One local event handler under a peer-assigned subscription id.
struct LocalSubscription {
    handle: u64,
    topic: String,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Listeners {
    connect: Vec<Box<dyn Fn() + Send + Sync>>,
    join: Vec<Box<dyn Fn(&SessionDetails) + Send + Sync>>,
    leave: Vec<Box<dyn Fn(&CloseDetails) + Send + Sync>>,
    disconnect: Vec<Box<dyn Fn(bool) + Send + Sync>>,
}

struct State {
    phase: SessionState,
    session_id: u64,
    realm: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    authenticators: Vec<Arc<dyn Authenticator>>,
    ids: IdGenerator,
    pending: HashMap<u64, Pending>,
    registrations: HashMap<u64, LocalRegistration>,
    subscriptions: HashMap<u64, Vec<LocalSubscription>>,
    join_reply: Option<oneshot::Sender<Result<SessionDetails>>>,
    goodbye_sent: bool,
}

impl State {
    fn new() -> Self {
        Self {
            phase: SessionState::Disconnected,
            session_id: 0,
            realm: None,
            transport: None,
            authenticators: Vec::new(),
            ids: IdGenerator::new(),
            pending: HashMap::new(),
            registrations: HashMap::new(),
            subscriptions: HashMap::new(),
            join_reply: None,
            goodbye_sent: false,
        }
    }

    fn send(&self, message: Message) -> Result<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| WampError::Transport("no transport attached".into()))?;
        debug!(msg = message.name(), ">>> TX");
        transport.send(message)
    }
}

struct Inner {
    state: Mutex<State>,
    listeners: Mutex<Listeners>,
}

/// A WAMP client session.
///
/// Cheap to clone; all clones share one underlying session. The session
/// borrows its transport (attached per connection attempt) and its
/// authenticators, and exclusively owns the correlation table and the
/// registration/subscription registries. The object can be reused for a
/// later connection attempt after a disconnect.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session in the disconnected state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new()),
                listeners: Mutex::new(Listeners::default()),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().phase
    }

    /// Session id assigned by the peer, if joined.
    pub fn session_id(&self) -> Option<u64> {
        let id = self.inner.state.lock().session_id;
        (id != 0).then_some(id)
    }

    /// Whether a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().transport.is_some()
    }

    // ------------------------------------------------------------------
    // Transport-facing entry points
    // ------------------------------------------------------------------

    /// Attach a connected transport. Fires connect listeners.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.transport.is_some() {
                return Err(WampError::Transport("already connected".into()));
            }
            state.transport = Some(transport);
        }
        let listeners = self.inner.listeners.lock();
        for listener in &listeners.connect {
            listener();
        }
        Ok(())
    }

    /// Deliver one inbound protocol message.
    ///
    /// Must be called in the order the peer sent the messages. The
    /// authenticator challenge computation is awaited here without
    /// holding the state lock, so a slow signer suspends only the
    /// handshake, not the process.
    pub async fn handle_message(&self, message: Message) {
        debug!(msg = message.name(), "<<< RX");
        let joined = self.inner.state.lock().session_id != 0;
        if joined {
            self.handle_session_message(message);
        } else {
            self.handle_establish_message(message).await;
        }
    }

    /// Handle transport loss. Fails all pending requests, discards the
    /// registries and fires disconnect listeners.
    pub fn handle_disconnect(&self, was_clean: bool) {
        let had_transport = {
            let mut state = self.inner.state.lock();
            if state.transport.is_none() && state.phase == SessionState::Disconnected {
                return;
            }
            for (_, entry) in state.pending.drain() {
                entry.fail(WampError::SessionClosed);
            }
            // Peer state is gone with the connection.
            state.registrations.clear();
            state.subscriptions.clear();
            if let Some(reply) = state.join_reply.take() {
                let _ = reply.send(Err(WampError::Transport("connection lost".into())));
            }
            state.session_id = 0;
            state.realm = None;
            state.authenticators.clear();
            state.transport = None;
            state.phase = SessionState::Disconnected;
            true
        };
        if had_transport {
            let listeners = self.inner.listeners.lock();
            for listener in &listeners.disconnect {
                listener(was_clean);
            }
        }
    }

    // ------------------------------------------------------------------
    // Public session API
    // ------------------------------------------------------------------

    /// Send HELLO for `realm` and await WELCOME.
    ///
    /// Advertises the method names of all configured authenticators;
    /// the future resolves when the peer welcomes the session and fails
    /// on ABORT, authentication failure or transport loss.
    pub fn join(
        &self,
        realm: &str,
        authenticators: Vec<Arc<dyn Authenticator>>,
    ) -> ReplyFuture<SessionDetails> {
        let mut state = self.inner.state.lock();
        if state.transport.is_none() {
            return ReplyFuture::resolved(Err(WampError::Transport(
                "the transport must be connected first".into(),
            )));
        }
        if state.phase != SessionState::Disconnected {
            return ReplyFuture::resolved(Err(WampError::Protocol(format!(
                "cannot join in state {:?}",
                state.phase
            ))));
        }

        let details = hello_details(&authenticators);
        state.realm = Some(realm.to_owned());
        state.authenticators = authenticators;
        state.goodbye_sent = false;

        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(Message::Hello {
            realm: realm.to_owned(),
            details,
        }) {
            return ReplyFuture::resolved(Err(err));
        }
        state.join_reply = Some(reply);
        state.phase = SessionState::HelloSent;
        future
    }

    /// Leave the realm: send GOODBYE and wait for the peer's reply or
    /// transport close.
    pub fn leave(&self, reason: Option<&str>, message: Option<&str>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return Err(WampError::NotJoined);
        }
        let mut details = Kwargs::new();
        if let Some(message) = message {
            details.insert("message".into(), json!(message));
        }
        state.send(Message::Goodbye {
            details,
            reason: reason.unwrap_or(CLOSE_NORMAL).to_owned(),
        })?;
        state.goodbye_sent = true;
        state.phase = SessionState::GoodbyeSent;
        Ok(())
    }

    /// Call a remote procedure.
    pub fn call(
        &self,
        procedure: &str,
        args: Args,
        kwargs: Kwargs,
        options: &CallOptions,
    ) -> ReplyFuture<CallResult> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return ReplyFuture::resolved(Err(WampError::NotJoined));
        }

        let mut opts = Kwargs::new();
        if let Some(timeout) = options.timeout {
            opts.insert("timeout".into(), json!(timeout.as_millis() as u64));
        }
        if options.disclose_me {
            opts.insert("disclose_me".into(), json!(true));
        }

        let request_id = state.ids.next_id();
        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(Message::Call {
            request_id,
            options: opts,
            procedure: procedure.to_owned(),
            args,
            kwargs,
        }) {
            return ReplyFuture::resolved(Err(err));
        }
        state.pending.insert(request_id, Pending::Call { reply });
        future
    }

    /// Register a procedure endpoint.
    pub fn register(
        &self,
        procedure: &str,
        endpoint: Arc<dyn InvocationHandler>,
        options: &RegisterOptions,
    ) -> ReplyFuture<Registration> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return ReplyFuture::resolved(Err(WampError::NotJoined));
        }

        let mut opts = Kwargs::new();
        if let Some(policy) = options.match_policy {
            opts.insert("match".into(), json!(policy.as_str()));
        }
        if let Some(policy) = options.invoke_policy {
            opts.insert("invoke".into(), json!(policy.as_str()));
        }

        let request_id = state.ids.next_id();
        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(Message::Register {
            request_id,
            options: opts,
            procedure: procedure.to_owned(),
        }) {
            return ReplyFuture::resolved(Err(err));
        }
        state.pending.insert(
            request_id,
            Pending::Register {
                reply,
                procedure: procedure.to_owned(),
                endpoint,
            },
        );
        future
    }

    /// Unregister a previously registered procedure.
    pub fn unregister(&self, registration: &Registration) -> ReplyFuture<()> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return ReplyFuture::resolved(Err(WampError::NotJoined));
        }
        if !state.registrations.contains_key(&registration.id) {
            return ReplyFuture::resolved(Err(WampError::application(
                ERROR_NO_SUCH_REGISTRATION,
            )));
        }

        let request_id = state.ids.next_id();
        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(Message::Unregister {
            request_id,
            registration_id: registration.id,
        }) {
            return ReplyFuture::resolved(Err(err));
        }
        state.pending.insert(
            request_id,
            Pending::Unregister {
                reply,
                registration_id: registration.id,
            },
        );
        future
    }

    /// Subscribe a handler to a topic.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        options: &SubscribeOptions,
    ) -> ReplyFuture<Subscription> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return ReplyFuture::resolved(Err(WampError::NotJoined));
        }

        let mut opts = Kwargs::new();
        if let Some(policy) = options.match_policy {
            opts.insert("match".into(), json!(policy.as_str()));
        }

        let request_id = state.ids.next_id();
        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(Message::Subscribe {
            request_id,
            options: opts,
            topic: topic.to_owned(),
        }) {
            return ReplyFuture::resolved(Err(err));
        }
        state.pending.insert(
            request_id,
            Pending::Subscribe {
                reply,
                topic: topic.to_owned(),
                handler,
            },
        );
        future
    }

    /// Drop a subscription handle.
    ///
    /// UNSUBSCRIBE is only sent once the last local handler under the
    /// peer-assigned subscription id is removed; until then the future
    /// resolves immediately.
    pub fn unsubscribe(&self, subscription: &Subscription) -> ReplyFuture<()> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return ReplyFuture::resolved(Err(WampError::NotJoined));
        }

        let known = match state.subscriptions.get(&subscription.id) {
            Some(entries) => (
                entries
                    .iter()
                    .any(|entry| entry.handle == subscription.handle),
                entries.len(),
            ),
            None => (false, 0),
        };
        let (held, count) = known;
        if !held {
            return ReplyFuture::resolved(Err(WampError::application(
                ERROR_NO_SUCH_SUBSCRIPTION,
            )));
        }

        if count > 1 {
            if let Some(entries) = state.subscriptions.get_mut(&subscription.id) {
                entries.retain(|entry| entry.handle != subscription.handle);
            }
            return ReplyFuture::resolved(Ok(()));
        }

        // Last handler under this id: the peer must drop the
        // subscription before the local entry goes, so a failed send
        // leaves the handler receiving events.
        let request_id = state.ids.next_id();
        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(Message::Unsubscribe {
            request_id,
            subscription_id: subscription.id,
        }) {
            return ReplyFuture::resolved(Err(err));
        }
        state.subscriptions.remove(&subscription.id);
        state.pending.insert(
            request_id,
            Pending::Unsubscribe {
                reply,
                subscription_id: subscription.id,
            },
        );
        future
    }

    /// Publish to a topic.
    ///
    /// With `options.acknowledge` the future resolves with the
    /// publication once the peer confirms; otherwise it resolves
    /// immediately with `None`.
    pub fn publish(
        &self,
        topic: &str,
        args: Args,
        kwargs: Kwargs,
        options: &PublishOptions,
    ) -> ReplyFuture<Option<Publication>> {
        let mut state = self.inner.state.lock();
        if state.phase != SessionState::Ready {
            return ReplyFuture::resolved(Err(WampError::NotJoined));
        }

        let mut opts = Kwargs::new();
        if options.acknowledge {
            opts.insert("acknowledge".into(), json!(true));
        }
        opts.insert("exclude_me".into(), json!(options.exclude_me));

        let request_id = state.ids.next_id();
        let message = Message::Publish {
            request_id,
            options: opts,
            topic: topic.to_owned(),
            args,
            kwargs,
        };

        if !options.acknowledge {
            return match state.send(message) {
                Ok(()) => ReplyFuture::resolved(Ok(None)),
                Err(err) => ReplyFuture::resolved(Err(err)),
            };
        }

        let (future, reply) = ReplyFuture::pending();
        if let Err(err) = state.send(message) {
            return ReplyFuture::resolved(Err(err));
        }
        state.pending.insert(request_id, Pending::Publish { reply });
        future
    }

    // ------------------------------------------------------------------
    // Lifecycle listeners
    // ------------------------------------------------------------------

    /// Register a callback fired when a transport is attached.
    pub fn on_connect<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.lock().connect.push(Box::new(listener));
    }

    /// Register a callback fired when the session joins a realm.
    pub fn on_join<F>(&self, listener: F)
    where
        F: Fn(&SessionDetails) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().join.push(Box::new(listener));
    }

    /// Register a callback fired when the session leaves (GOODBYE or
    /// ABORT), with the close reason.
    pub fn on_leave<F>(&self, listener: F)
    where
        F: Fn(&CloseDetails) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().leave.push(Box::new(listener));
    }

    /// Register a callback fired when the transport goes away, with the
    /// clean/unclean flag.
    pub fn on_disconnect<F>(&self, listener: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .disconnect
            .push(Box::new(listener));
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Messages arriving before the session is established: WELCOME,
    /// ABORT and CHALLENGE.
    async fn handle_establish_message(&self, message: Message) {
        match message {
            Message::Welcome { session_id, .. } => {
                let details = {
                    let mut state = self.inner.state.lock();
                    state.session_id = session_id;
                    state.phase = SessionState::Joined;
                    let details = SessionDetails {
                        realm: state.realm.clone().unwrap_or_default(),
                        session_id,
                    };
                    if let Some(reply) = state.join_reply.take() {
                        let _ = reply.send(Ok(details.clone()));
                    }
                    state.phase = SessionState::Ready;
                    details
                };
                let listeners = self.inner.listeners.lock();
                for listener in &listeners.join {
                    listener(&details);
                }
            }
            Message::Abort { details, reason } => {
                let message = details
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let transport = {
                    let mut state = self.inner.state.lock();
                    if let Some(reply) = state.join_reply.take() {
                        let mut kwargs = Kwargs::new();
                        if let Some(message) = &message {
                            kwargs.insert("message".into(), json!(message));
                        }
                        let _ = reply.send(Err(WampError::application_with(
                            reason.clone(),
                            Args::new(),
                            kwargs,
                        )));
                    }
                    state.phase = SessionState::Disconnected;
                    state.transport.clone()
                };
                let close = CloseDetails { reason, message };
                {
                    let listeners = self.inner.listeners.lock();
                    for listener in &listeners.leave {
                        listener(&close);
                    }
                }
                if let Some(transport) = transport {
                    if transport.is_open() {
                        let _ = transport.close();
                    }
                }
            }
            Message::Challenge { method, extra } => {
                self.handle_challenge(Challenge { method, extra }).await;
            }
            other => {
                warn!(
                    msg = other.name(),
                    "dropping message received before session establishment"
                );
            }
        }
    }

    /// Run the configured authenticator for the peer's challenge and
    /// answer with AUTHENTICATE.
    ///
    /// The challenge computation runs without the state lock; inbound
    /// processing continues while a slow authenticator (hardware key)
    /// is pending.
    async fn handle_challenge(&self, challenge: Challenge) {
        let authenticator = {
            let state = self.inner.state.lock();
            state
                .authenticators
                .iter()
                .find(|auth| auth.auth_method() == challenge.method)
                .cloned()
        };

        let Some(authenticator) = authenticator else {
            self.fail_connect_attempt(WampError::Authentication(format!(
                "server requested auth method {:?} but no matching authenticator is configured",
                challenge.method
            )));
            return;
        };

        match authenticator.on_challenge(&challenge).await {
            Ok(response) => {
                let mut state = self.inner.state.lock();
                // The connect attempt may have been aborted while the
                // authenticator was computing.
                if state.phase != SessionState::HelloSent {
                    warn!(
                        phase = ?state.phase,
                        "discarding challenge response for an ended connect attempt"
                    );
                    return;
                }
                let sent = state.send(Message::Authenticate {
                    signature: response.signature,
                    extra: response.extra,
                });
                match sent {
                    Ok(()) => state.phase = SessionState::AuthenticateSent,
                    Err(err) => {
                        drop(state);
                        self.fail_connect_attempt(err);
                    }
                }
            }
            Err(err) => {
                self.fail_connect_attempt(WampError::Authentication(format!(
                    "challenge handler failed: {err}"
                )));
            }
        }
    }

    /// Fail the in-flight join and drop the connection.
    fn fail_connect_attempt(&self, err: WampError) {
        let transport = {
            let mut state = self.inner.state.lock();
            if let Some(reply) = state.join_reply.take() {
                let _ = reply.send(Err(err));
            }
            state.phase = SessionState::Disconnected;
            state.transport.clone()
        };
        if let Some(transport) = transport {
            let _ = transport.abort();
        }
    }

    /// Messages arriving on an established session.
    fn handle_session_message(&self, message: Message) {
        match message {
            Message::Result {
                request_id,
                args,
                kwargs,
                ..
            } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(Pending::Call { reply }) => {
                        let _ = reply.send(Ok(CallResult { args, kwargs }));
                    }
                    Some(other) => {
                        warn!(request_id, "RESULT for non-call request, dropping");
                        state.pending.insert(request_id, other);
                    }
                    // A reply can race a local teardown; noise, not fatal.
                    None => warn!(request_id, "RESULT for unknown request, dropping"),
                }
            }
            Message::Registered {
                request_id,
                registration_id,
            } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(Pending::Register {
                        reply,
                        procedure,
                        endpoint,
                    }) => {
                        state.registrations.insert(
                            registration_id,
                            LocalRegistration {
                                procedure: procedure.clone(),
                                endpoint,
                            },
                        );
                        let _ = reply.send(Ok(Registration {
                            id: registration_id,
                            procedure,
                        }));
                    }
                    Some(other) => {
                        warn!(request_id, "REGISTERED for non-register request, dropping");
                        state.pending.insert(request_id, other);
                    }
                    None => warn!(request_id, "REGISTERED for unknown request, dropping"),
                }
            }
            Message::Subscribed {
                request_id,
                subscription_id,
            } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(Pending::Subscribe {
                        reply,
                        topic,
                        handler,
                    }) => {
                        let handle = state.ids.next_id();
                        state
                            .subscriptions
                            .entry(subscription_id)
                            .or_default()
                            .push(LocalSubscription {
                                handle,
                                topic: topic.clone(),
                                handler,
                            });
                        let _ = reply.send(Ok(Subscription {
                            id: subscription_id,
                            topic,
                            handle,
                        }));
                    }
                    Some(other) => {
                        warn!(request_id, "SUBSCRIBED for non-subscribe request, dropping");
                        state.pending.insert(request_id, other);
                    }
                    None => warn!(request_id, "SUBSCRIBED for unknown request, dropping"),
                }
            }
            Message::Published {
                request_id,
                publication_id,
            } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(Pending::Publish { reply }) => {
                        let _ = reply.send(Ok(Some(Publication { id: publication_id })));
                    }
                    Some(other) => {
                        warn!(request_id, "PUBLISHED for non-publish request, dropping");
                        state.pending.insert(request_id, other);
                    }
                    None => warn!(request_id, "PUBLISHED for unknown request, dropping"),
                }
            }
            Message::Unregistered { request_id } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(Pending::Unregister {
                        reply,
                        registration_id,
                    }) => {
                        state.registrations.remove(&registration_id);
                        let _ = reply.send(Ok(()));
                    }
                    Some(other) => {
                        warn!(
                            request_id,
                            "UNREGISTERED for non-unregister request, dropping"
                        );
                        state.pending.insert(request_id, other);
                    }
                    None => warn!(request_id, "UNREGISTERED for unknown request, dropping"),
                }
            }
            Message::Unsubscribed { request_id } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(Pending::Unsubscribe {
                        reply,
                        subscription_id,
                    }) => {
                        state.subscriptions.remove(&subscription_id);
                        let _ = reply.send(Ok(()));
                    }
                    Some(other) => {
                        warn!(
                            request_id,
                            "UNSUBSCRIBED for non-unsubscribe request, dropping"
                        );
                        state.pending.insert(request_id, other);
                    }
                    None => warn!(request_id, "UNSUBSCRIBED for unknown request, dropping"),
                }
            }
            Message::Error {
                request_type,
                request_id,
                error,
                args,
                kwargs,
                ..
            } => {
                let mut state = self.inner.state.lock();
                match state.pending.remove(&request_id) {
                    Some(entry) if entry.request_type() == request_type => {
                        entry.fail(WampError::application_with(error, args, kwargs));
                    }
                    Some(other) => {
                        warn!(
                            request_id,
                            request_type, "ERROR request type mismatch, dropping"
                        );
                        state.pending.insert(request_id, other);
                    }
                    None => warn!(request_id, "ERROR for unknown request, dropping"),
                }
            }
            Message::Event {
                subscription_id,
                publication_id,
                details,
                args,
                kwargs,
            } => self.dispatch_event(subscription_id, publication_id, &details, args, kwargs),
            Message::Invocation {
                request_id,
                registration_id,
                args,
                kwargs,
                ..
            } => self.dispatch_invocation(request_id, registration_id, args, kwargs),
            Message::Goodbye { details, reason } => self.handle_goodbye(&details, reason),
            other => {
                warn!(msg = other.name(), "unexpected message on joined session");
            }
        }
    }

    /// Deliver an event to every local handler under its subscription
    /// id. Unknown ids are dropped: the event may race an unsubscribe.
    fn dispatch_event(
        &self,
        subscription_id: u64,
        publication_id: u64,
        details: &Kwargs,
        args: Args,
        kwargs: Kwargs,
    ) {
        let handlers: Vec<(String, Arc<dyn EventHandler>)> = {
            let state = self.inner.state.lock();
            match state.subscriptions.get(&subscription_id) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (entry.topic.clone(), Arc::clone(&entry.handler)))
                    .collect(),
                None => {
                    warn!(subscription_id, "EVENT for unknown subscription, dropping");
                    return;
                }
            }
        };

        let wire_topic = details.get("topic").and_then(Value::as_str);
        for (topic, handler) in handlers {
            let event = EventDetails {
                subscription_id,
                publication_id,
                topic: wire_topic.map_or(topic, str::to_owned),
            };
            // Handler runs outside the state lock; a subscriber may
            // call back into the session.
            handler.on_event(args.clone(), kwargs.clone(), &event);
        }
    }

    /// Invoke the local endpoint for an INVOCATION and answer with
    /// YIELD or ERROR. Endpoint failures never propagate into the
    /// session state machine.
    fn dispatch_invocation(&self, request_id: u64, registration_id: u64, args: Args, kwargs: Kwargs) {
        let target = {
            let state = self.inner.state.lock();
            state
                .registrations
                .get(&registration_id)
                .map(|registration| {
                    (
                        registration.procedure.clone(),
                        Arc::clone(&registration.endpoint),
                    )
                })
        };

        let Some((procedure, endpoint)) = target else {
            warn!(registration_id, "INVOCATION for unknown registration");
            self.send_invocation_error(
                request_id,
                ERROR_NO_SUCH_REGISTRATION.to_owned(),
                Args::new(),
                Kwargs::new(),
            );
            return;
        };

        let details = InvocationDetails {
            registration_id,
            procedure,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            endpoint.invoke(args, kwargs, &details)
        }));

        match outcome {
            Ok(Ok(result)) => {
                let state = self.inner.state.lock();
                let _ = state.send(Message::Yield {
                    request_id,
                    options: Kwargs::new(),
                    args: result.args,
                    kwargs: result.kwargs,
                });
            }
            Ok(Err(WampError::Application { uri, args, kwargs })) => {
                self.send_invocation_error(request_id, uri, args, kwargs);
            }
            Ok(Err(err)) => {
                self.send_invocation_error(
                    request_id,
                    ERROR_RUNTIME.to_owned(),
                    vec![json!(err.to_string())],
                    Kwargs::new(),
                );
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "endpoint panicked".to_owned());
                self.send_invocation_error(
                    request_id,
                    ERROR_RUNTIME.to_owned(),
                    vec![json!(reason)],
                    Kwargs::new(),
                );
            }
        }
    }

    fn send_invocation_error(&self, request_id: u64, error: String, args: Args, kwargs: Kwargs) {
        let state = self.inner.state.lock();
        let _ = state.send(Message::Error {
            request_type: MSG_INVOCATION,
            request_id,
            details: Kwargs::new(),
            error,
            args,
            kwargs,
        });
    }

    /// Peer-initiated or replied GOODBYE. Acknowledge if needed, then
    /// close the transport; teardown completes on the disconnect
    /// callback.
    fn handle_goodbye(&self, details: &Kwargs, reason: String) {
        let transport = {
            let mut state = self.inner.state.lock();
            if !state.goodbye_sent {
                let _ = state.send(Message::Goodbye {
                    details: Kwargs::new(),
                    reason: CLOSE_GOODBYE_AND_OUT.to_owned(),
                });
                state.goodbye_sent = true;
            }
            state.phase = SessionState::DisconnectedResumable;
            state.transport.clone()
        };

        let close = CloseDetails {
            reason,
            message: details
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
        };
        {
            let listeners = self.inner.listeners.lock();
            for listener in &listeners.leave {
                listener(&close);
            }
        }
        if let Some(transport) = transport {
            if transport.is_open() {
                let _ = transport.close();
            }
        }
    }
}

/// Build the HELLO details dict: client roles plus the advertised
/// authentication methods, authid and authextra.
fn hello_details(authenticators: &[Arc<dyn Authenticator>]) -> Kwargs {
    let mut roles = Kwargs::new();
    for role in ["publisher", "subscriber", "caller", "callee"] {
        roles.insert(role.to_owned(), json!({}));
    }
    let mut details = Kwargs::new();
    details.insert("roles".into(), Value::Object(roles));

    if !authenticators.is_empty() {
        let methods: Vec<&str> = authenticators.iter().map(|auth| auth.auth_method()).collect();
        details.insert("authmethods".into(), json!(methods));
        if let Some(authid) = authenticators.iter().find_map(|auth| auth.auth_id()) {
            details.insert("authid".into(), json!(authid));
        }
        let mut extra = Kwargs::new();
        for auth in authenticators {
            if let Some(auth_extra) = auth.auth_extra() {
                extra.extend(auth_extra);
            }
        }
        if !extra.is_empty() {
            details.insert("authextra".into(), Value::Object(extra));
        }
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Transport stub that records outbound messages.
    #[derive(Default)]
    struct RecordingTransport {
        sent: PlMutex<Vec<Message>>,
        open: std::sync::atomic::AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            let transport = Self::default();
            transport
                .open
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Arc::new(transport)
        }

        fn sent(&self) -> Vec<Message> {
            self.sent.lock().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, message: Message) -> Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn close(&self) -> Result<()> {
            self.open.store(false, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn abort(&self) -> Result<()> {
            self.close()
        }
    }

    async fn joined_session() -> (Session, Arc<RecordingTransport>) {
        let session = Session::new();
        let transport = RecordingTransport::new();
        session
            .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .unwrap();
        let join = session.join("realm1", Vec::new());
        session
            .handle_message(Message::Welcome {
                session_id: 99,
                details: Kwargs::new(),
            })
            .await;
        join.await.unwrap();
        (session, transport)
    }

    #[tokio::test]
    async fn test_join_sends_hello_with_roles() {
        let session = Session::new();
        let transport = RecordingTransport::new();
        session
            .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .unwrap();
        let _join = session.join("realm1", Vec::new());
        assert_eq!(session.state(), SessionState::HelloSent);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Message::Hello { realm, details } => {
                assert_eq!(realm, "realm1");
                let roles = details.get("roles").unwrap().as_object().unwrap();
                assert!(roles.contains_key("caller"));
                assert!(roles.contains_key("subscriber"));
            }
            other => panic!("expected HELLO, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_welcome_promotes_to_ready() {
        let (session, _transport) = joined_session().await;
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.session_id(), Some(99));
    }

    #[tokio::test]
    async fn test_call_before_join_fails() {
        let session = Session::new();
        let result = session
            .call("com.example.echo", Args::new(), Kwargs::new(), &CallOptions::default())
            .await;
        assert!(matches!(result, Err(WampError::NotJoined)));
    }

    #[tokio::test]
    async fn test_call_resolves_on_result() {
        let (session, transport) = joined_session().await;
        let call = session.call(
            "com.example.echo",
            vec![json!("x")],
            Kwargs::new(),
            &CallOptions::default(),
        );
        let request_id = match transport.sent().last().unwrap() {
            Message::Call { request_id, .. } => *request_id,
            other => panic!("expected CALL, got {}", other.name()),
        };
        session
            .handle_message(Message::Result {
                request_id,
                details: Kwargs::new(),
                args: vec![json!("x")],
                kwargs: Kwargs::new(),
            })
            .await;
        let result = call.await.unwrap();
        assert_eq!(result.args, vec![json!("x")]);
    }

    #[tokio::test]
    async fn test_unknown_result_is_dropped() {
        let (session, _transport) = joined_session().await;
        session
            .handle_message(Message::Result {
                request_id: 777,
                details: Kwargs::new(),
                args: Args::new(),
                kwargs: Kwargs::new(),
            })
            .await;
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_and_resets() {
        let (session, _transport) = joined_session().await;
        let call = session.call(
            "com.example.slow",
            Args::new(),
            Kwargs::new(),
            &CallOptions::default(),
        );
        session.handle_disconnect(false);
        assert!(matches!(call.await, Err(WampError::SessionClosed)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_invocation_for_unknown_registration_yields_error_reply() {
        let (session, transport) = joined_session().await;
        session
            .handle_message(Message::Invocation {
                request_id: 5,
                registration_id: 404,
                details: Kwargs::new(),
                args: Args::new(),
                kwargs: Kwargs::new(),
            })
            .await;
        match transport.sent().last().unwrap() {
            Message::Error {
                request_type,
                request_id,
                error,
                ..
            } => {
                assert_eq!(*request_type, MSG_INVOCATION);
                assert_eq!(*request_id, 5);
                assert_eq!(error, ERROR_NO_SUCH_REGISTRATION);
            }
            other => panic!("expected ERROR, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_goodbye_exchange_reaches_resumable_state() {
        let (session, transport) = joined_session().await;
        session.leave(None, Some("bye")).unwrap();
        assert_eq!(session.state(), SessionState::GoodbyeSent);
        match transport.sent().last().unwrap() {
            Message::Goodbye { reason, details } => {
                assert_eq!(reason, CLOSE_NORMAL);
                assert_eq!(details.get("message"), Some(&json!("bye")));
            }
            other => panic!("expected GOODBYE, got {}", other.name()),
        }

        session
            .handle_message(Message::Goodbye {
                details: Kwargs::new(),
                reason: CLOSE_GOODBYE_AND_OUT.to_owned(),
            })
            .await;
        assert_eq!(session.state(), SessionState::DisconnectedResumable);
        // We already sent GOODBYE, so no acknowledgement goes out.
        assert!(!transport
            .sent()
            .iter()
            .any(|m| matches!(m, Message::Goodbye { reason, .. } if reason == CLOSE_GOODBYE_AND_OUT)));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_peer_goodbye_is_acknowledged() {
        let (session, transport) = joined_session().await;
        session
            .handle_message(Message::Goodbye {
                details: Kwargs::new(),
                reason: "wamp.close.system_shutdown".to_owned(),
            })
            .await;
        match transport.sent().last().unwrap() {
            Message::Goodbye { reason, .. } => assert_eq!(reason, CLOSE_GOODBYE_AND_OUT),
            other => panic!("expected GOODBYE reply, got {}", other.name()),
        }
        assert_eq!(session.state(), SessionState::DisconnectedResumable);
    }

    #[tokio::test]
    async fn test_subscribe_and_event_dispatch() {
        use std::sync::atomic::{AtomicU64, Ordering};
        let (session, transport) = joined_session().await;
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = Arc::clone(&seen);
        let handler = crate::protocol::handler::event_fn(move |args, _kwargs, _details| {
            seen2.store(args[0].as_u64().unwrap(), Ordering::SeqCst);
        });
        let subscribe = session.subscribe("com.example.topic", handler, &SubscribeOptions::default());
        let request_id = match transport.sent().last().unwrap() {
            Message::Subscribe { request_id, .. } => *request_id,
            other => panic!("expected SUBSCRIBE, got {}", other.name()),
        };
        session
            .handle_message(Message::Subscribed {
                request_id,
                subscription_id: 4100,
            })
            .await;
        let subscription = subscribe.await.unwrap();
        assert_eq!(subscription.id, 4100);

        session
            .handle_message(Message::Event {
                subscription_id: 4100,
                publication_id: 1,
                details: Kwargs::new(),
                args: vec![json!(42)],
                kwargs: Kwargs::new(),
            })
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_error_reply_fails_call() {
        let (session, transport) = joined_session().await;
        let call = session.call(
            "com.example.missing",
            Args::new(),
            Kwargs::new(),
            &CallOptions::default(),
        );
        let request_id = match transport.sent().last().unwrap() {
            Message::Call { request_id, .. } => *request_id,
            other => panic!("expected CALL, got {}", other.name()),
        };
        session
            .handle_message(Message::Error {
                request_type: MSG_CALL,
                request_id,
                details: Kwargs::new(),
                error: "wamp.error.no_such_procedure".to_owned(),
                args: Args::new(),
                kwargs: Kwargs::new(),
            })
            .await;
        let err = call.await.unwrap_err();
        assert_eq!(err.uri(), Some("wamp.error.no_such_procedure"));
    }
}
