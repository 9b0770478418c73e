//! WAMP protocol core: messages, identifiers, session engine.
//!
//! [`message`] defines the wire-level message set and its neutral-tree
//! marshalling, [`id`] the shared request-id space, [`types`] the
//! payload and option structs exchanged with application code, and
//! [`session`] the state machine that ties them together over a
//! [`Transport`](crate::transport::Transport).

pub mod handler;
pub mod id;
pub mod message;
pub mod session;
pub mod types;

pub use handler::{endpoint_fn, event_fn, EventHandler, InvocationHandler};
pub use id::{IdGenerator, MAX_ID};
pub use message::Message;
pub use session::{ReplyFuture, Session, SessionState};
