//! Value types exchanged through the public session API.
//!
//! Options structs map one-to-one onto the `options`/`details`
//! dictionaries of the wire messages; result and detail structs carry
//! what the peer reported back.

use std::time::Duration;

use serde_json::Value;

/// Positional payload of a WAMP message.
pub type Args = Vec<Value>;

/// Keyword payload of a WAMP message.
pub type Kwargs = serde_json::Map<String, Value>;

/// Topic/procedure match policy for registrations and subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// URI must match exactly (default).
    Exact,
    /// URI is a prefix of the procedure/topic.
    Prefix,
    /// URI contains wildcard components.
    Wildcard,
}

impl MatchPolicy {
    /// Wire value used in `options.match`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Wildcard => "wildcard",
        }
    }
}

/// Invocation distribution policy for shared registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokePolicy {
    /// Only one callee may register (default).
    Single,
    /// Round-robin across callees.
    RoundRobin,
    /// Random callee.
    Random,
    /// First registered callee.
    First,
    /// Last registered callee.
    Last,
}

impl InvokePolicy {
    /// Wire value used in `options.invoke`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::RoundRobin => "roundrobin",
            Self::Random => "random",
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

/// Options for [`call`](crate::protocol::session::Session::call).
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Router-side call timeout. `None` leaves the router default.
    pub timeout: Option<Duration>,
    /// Disclose the caller identity to the callee.
    pub disclose_me: bool,
}

/// Options for [`publish`](crate::protocol::session::Session::publish).
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Request a PUBLISHED acknowledgement from the router.
    pub acknowledge: bool,
    /// Exclude the publishing session from event delivery.
    pub exclude_me: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            acknowledge: true,
            exclude_me: true,
        }
    }
}

/// Options for [`register`](crate::protocol::session::Session::register).
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Procedure URI match policy.
    pub match_policy: Option<MatchPolicy>,
    /// Invocation distribution policy.
    pub invoke_policy: Option<InvokePolicy>,
}

/// Options for [`subscribe`](crate::protocol::session::Session::subscribe).
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Topic URI match policy.
    pub match_policy: Option<MatchPolicy>,
}

/// Result of a remote procedure call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResult {
    /// Positional results.
    pub args: Args,
    /// Keyword results.
    pub kwargs: Kwargs,
}

/// Result returned by a local invocation endpoint, sent back as YIELD.
#[derive(Debug, Clone, Default)]
pub struct InvocationResult {
    /// Positional results.
    pub args: Args,
    /// Keyword results.
    pub kwargs: Kwargs,
}

impl InvocationResult {
    /// Single positional result value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            args: vec![value.into()],
            kwargs: Kwargs::new(),
        }
    }
}

/// Details of an established session, delivered on join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    /// Realm the session joined.
    pub realm: String,
    /// Session id assigned by the peer.
    pub session_id: u64,
}

/// Details of a session close (GOODBYE or ABORT).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseDetails {
    /// Close reason URI, e.g. `wamp.close.normal`.
    pub reason: String,
    /// Optional human readable message.
    pub message: Option<String>,
}

/// A confirmed procedure registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Registration id assigned by the peer.
    pub id: u64,
    /// Registered procedure URI.
    pub procedure: String,
}

/// A confirmed topic subscription.
///
/// The peer may hand out the same subscription id for repeated
/// subscribes to one topic; `handle` distinguishes the local handler
/// so each subscription can be dropped individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Subscription id assigned by the peer.
    pub id: u64,
    /// Subscribed topic URI.
    pub topic: String,
    /// Local handler handle, unique per subscribe() call.
    pub handle: u64,
}

/// A confirmed publication (only for acknowledged publishes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publication {
    /// Publication id assigned by the peer.
    pub id: u64,
}

/// Details delivered with each event to a subscriber.
#[derive(Debug, Clone)]
pub struct EventDetails {
    /// Subscription the event was delivered on.
    pub subscription_id: u64,
    /// Publication id of the event.
    pub publication_id: u64,
    /// Topic the event was published to.
    pub topic: String,
}

/// Details delivered with each invocation to an endpoint.
#[derive(Debug, Clone)]
pub struct InvocationDetails {
    /// Registration the invocation targets.
    pub registration_id: u64,
    /// Procedure URI of the registration.
    pub procedure: String,
}

/// A challenge received from the peer during authentication.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Authentication method the peer selected, e.g. `wampcra`.
    pub method: String,
    /// Method-specific challenge data.
    pub extra: Kwargs,
}

/// Response computed by an authenticator for a challenge.
#[derive(Debug, Clone)]
pub struct ChallengeResponse {
    /// Signature/proof string sent in AUTHENTICATE.
    pub signature: String,
    /// Optional extra data sent alongside the signature.
    pub extra: Kwargs,
}

/// Outcome of a finished connection, resolved by
/// [`Connection::closed`](crate::client::Connection::closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Whether the connection closed cleanly.
    pub was_clean: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_policy_wire_values() {
        assert_eq!(MatchPolicy::Exact.as_str(), "exact");
        assert_eq!(MatchPolicy::Prefix.as_str(), "prefix");
        assert_eq!(MatchPolicy::Wildcard.as_str(), "wildcard");
    }

    #[test]
    fn test_invoke_policy_wire_values() {
        assert_eq!(InvokePolicy::Single.as_str(), "single");
        assert_eq!(InvokePolicy::RoundRobin.as_str(), "roundrobin");
        assert_eq!(InvokePolicy::Random.as_str(), "random");
        assert_eq!(InvokePolicy::First.as_str(), "first");
        assert_eq!(InvokePolicy::Last.as_str(), "last");
    }

    #[test]
    fn test_publish_options_default_acknowledges() {
        let options = PublishOptions::default();
        assert!(options.acknowledge);
        assert!(options.exclude_me);
    }
}
