//! Authentication handshakes against known reference vectors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;
use wamp::auth::{AnonymousAuth, Authenticator, CraAuth, CryptosignAuth, TicketAuth};
use wamp::error::Result;
use wamp::protocol::message::Message;
use wamp::protocol::session::{Session, SessionState};
use wamp::protocol::types::{Challenge, ChallengeResponse, Kwargs};
use wamp::transport::Transport;

const CRYPTOSIGN_PRIVATE_KEY: &str =
    "61b297d1573d0a2a6ac58d7fd39369adbd365c5b3276bd69edf661c92b7ad9ff";
const CRYPTOSIGN_PUBLIC_KEY: &str =
    "ea971c008ee99021eaf48342791442dd742259a4bf14004fa3500d1fa6995211";
const CRYPTOSIGN_CHALLENGE: &str = "f9d17535fb925e9f674d648cbfc41399";
const CRYPTOSIGN_SIGNATURE: &str =
    "539707667d93bb9eb01e72be9ca5e00006bb6b1b786d697b3f189ebf5a0f60c70b8054f3735e19b77df31dc990864fb21259cfe3021f9a7e8ec0427c2077840a";

#[derive(Default)]
struct ScriptedTransport {
    sent: Mutex<Vec<Message>>,
    open: AtomicBool,
}

impl ScriptedTransport {
    fn connect() -> Arc<Self> {
        let transport = Self::default();
        transport.open.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    fn last(&self) -> Message {
        self.sent.lock().last().cloned().expect("nothing sent")
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, message: Message) -> Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&self) -> Result<()> {
        self.close()
    }
}

fn challenge(method: &str, extra: Kwargs) -> Message {
    Message::Challenge {
        method: method.into(),
        extra,
    }
}

#[tokio::test]
async fn test_wampcra_handshake_signs_reference_vector() {
    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();

    let join = session.join("realm1", vec![Arc::new(CraAuth::new("joe", "secret")) as _]);
    match transport.last() {
        Message::Hello { details, .. } => {
            assert_eq!(details.get("authmethods"), Some(&json!(["wampcra"])));
            assert_eq!(details.get("authid"), Some(&json!("joe")));
        }
        other => panic!("expected HELLO, got {}", other.name()),
    }

    let mut extra = Kwargs::new();
    extra.insert("challenge".into(), json!("abc123"));
    session.handle_message(challenge("wampcra", extra)).await;

    match transport.last() {
        Message::Authenticate { signature, .. } => {
            assert_eq!(signature, "WuWsgCoaXJT7aD4b+hIfn3AKJplSE/8vwcUD60PsccY=");
        }
        other => panic!("expected AUTHENTICATE, got {}", other.name()),
    }
    assert_eq!(session.state(), SessionState::AuthenticateSent);

    session
        .handle_message(Message::Welcome {
            session_id: 1,
            details: Kwargs::new(),
        })
        .await;
    assert!(join.await.is_ok());
}

#[tokio::test]
async fn test_salted_wampcra_handshake() {
    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();
    let _join = session.join("realm1", vec![Arc::new(CraAuth::new("joe", "secret")) as _]);

    let mut extra = Kwargs::new();
    extra.insert("challenge".into(), json!("abc123"));
    extra.insert("salt".into(), json!("salt123"));
    extra.insert("iterations".into(), json!(100));
    extra.insert("keylen".into(), json!(32));
    session.handle_message(challenge("wampcra", extra)).await;

    match transport.last() {
        Message::Authenticate { signature, .. } => {
            assert_eq!(signature, "S+ybul/dBfSFPiSaMAE7dIAlzrfkGeItmcrxcy3JBx0=");
        }
        other => panic!("expected AUTHENTICATE, got {}", other.name()),
    }
}

#[tokio::test]
async fn test_cryptosign_handshake_signs_reference_vector() {
    let auth =
        CryptosignAuth::from_private_key_hex(Some("device1"), CRYPTOSIGN_PRIVATE_KEY).unwrap();
    assert_eq!(auth.public_key_hex(), CRYPTOSIGN_PUBLIC_KEY);

    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();
    let _join = session.join("realm1", vec![Arc::new(auth) as _]);

    match transport.last() {
        Message::Hello { details, .. } => {
            let extra = details.get("authextra").unwrap().as_object().unwrap();
            assert_eq!(extra.get("pubkey"), Some(&json!(CRYPTOSIGN_PUBLIC_KEY)));
        }
        other => panic!("expected HELLO, got {}", other.name()),
    }

    let mut extra = Kwargs::new();
    extra.insert("challenge".into(), json!(CRYPTOSIGN_CHALLENGE));
    session.handle_message(challenge("cryptosign", extra)).await;

    match transport.last() {
        Message::Authenticate { signature, .. } => {
            assert_eq!(
                signature,
                format!("{CRYPTOSIGN_SIGNATURE}{CRYPTOSIGN_CHALLENGE}")
            );
        }
        other => panic!("expected AUTHENTICATE, got {}", other.name()),
    }
}

#[tokio::test]
async fn test_ticket_handshake_sends_ticket() {
    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();
    let _join = session.join(
        "realm1",
        vec![Arc::new(TicketAuth::new("joe", "opaque-token")) as _],
    );

    session.handle_message(challenge("ticket", Kwargs::new())).await;
    match transport.last() {
        Message::Authenticate { signature, .. } => assert_eq!(signature, "opaque-token"),
        other => panic!("expected AUTHENTICATE, got {}", other.name()),
    }
}

#[tokio::test]
async fn test_challenge_without_matching_authenticator_aborts() {
    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();
    let join = session.join("realm1", vec![Arc::new(AnonymousAuth::new()) as _]);

    session.handle_message(challenge("wampcra", Kwargs::new())).await;
    let err = join.await.unwrap_err();
    assert!(matches!(err, wamp::error::WampError::Authentication(_)));
    assert!(!transport.is_open());
    assert_eq!(session.state(), SessionState::Disconnected);
}

/// Authenticator whose challenge computation blocks until released.
struct GatedAuth {
    gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl Authenticator for GatedAuth {
    fn auth_method(&self) -> &'static str {
        "ticket"
    }

    async fn on_challenge(&self, _challenge: &Challenge) -> Result<ChallengeResponse> {
        let gate = self.gate.lock().await.take().expect("challenged twice");
        let _ = gate.await;
        Ok(ChallengeResponse {
            signature: "late".into(),
            extra: Kwargs::new(),
        })
    }
}

#[tokio::test]
async fn test_abort_during_slow_challenge_suppresses_authenticate() {
    let (release, gate) = oneshot::channel();
    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();
    let join = session.join(
        "realm1",
        vec![Arc::new(GatedAuth {
            gate: tokio::sync::Mutex::new(Some(gate)),
        }) as _],
    );

    // The challenge response is still being computed when ABORT lands.
    let pending = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .handle_message(challenge("ticket", Kwargs::new()))
                .await;
        })
    };
    session
        .handle_message(Message::Abort {
            details: Kwargs::new(),
            reason: "wamp.error.no_such_realm".into(),
        })
        .await;
    let err = join.await.unwrap_err();
    assert_eq!(err.uri(), Some("wamp.error.no_such_realm"));

    // Releasing the authenticator now must not produce AUTHENTICATE
    // for the ended connect attempt.
    release.send(()).unwrap();
    pending.await.unwrap();
    assert!(!transport
        .sent
        .lock()
        .iter()
        .any(|message| matches!(message, Message::Authenticate { .. })));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_multiple_authenticators_advertised_in_order() {
    let session = Session::new();
    let transport = ScriptedTransport::connect();
    session
        .attach_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .unwrap();
    let authenticators: Vec<Arc<dyn Authenticator>> = vec![
        Arc::new(TicketAuth::new("joe", "token")),
        Arc::new(AnonymousAuth::new()),
    ];
    let _join = session.join("realm1", authenticators);

    match transport.last() {
        Message::Hello { details, .. } => {
            assert_eq!(
                details.get("authmethods"),
                Some(&json!(["ticket", "anonymous"]))
            );
        }
        other => panic!("expected HELLO, got {}", other.name()),
    }
}
