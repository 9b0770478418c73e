//! Authentication methods for session establishment.
//!
//! An [`Authenticator`] contributes its method name, authid and
//! authextra to the HELLO details, and answers the server's CHALLENGE
//! for its method. A session carries an ordered list of authenticators;
//! the first whose method matches the challenge wins.
//!
//! Built-ins: [`AnonymousAuth`], [`TicketAuth`], [`CraAuth`]
//! (WAMP-CRA, plain and salted) and [`CryptosignAuth`] (Ed25519).

mod anonymous;
mod cryptosign;
mod ticket;
mod wampcra;

pub use anonymous::AnonymousAuth;
pub use cryptosign::CryptosignAuth;
pub use ticket::TicketAuth;
pub use wampcra::CraAuth;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::types::{Challenge, ChallengeResponse, Kwargs};

/// One authentication method offered to the server.
///
/// `on_challenge` is async so signers backed by slow key material
/// (hardware tokens, remote KMS) do not block the session's inbound
/// path.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// WAMP method name advertised in HELLO, e.g. `wampcra`.
    fn auth_method(&self) -> &'static str;

    /// The authid to announce, if this method carries one.
    fn auth_id(&self) -> Option<&str> {
        None
    }

    /// Extra HELLO details this method contributes (e.g. a public key).
    fn auth_extra(&self) -> Option<Kwargs> {
        None
    }

    /// Compute the AUTHENTICATE payload for the server's challenge.
    async fn on_challenge(&self, challenge: &Challenge) -> Result<ChallengeResponse>;
}
