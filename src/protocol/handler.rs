//! Endpoint and subscriber handler seams.
//!
//! Application code plugs plain closures into `register()` and
//! `subscribe()` through the [`endpoint_fn`] and [`event_fn`] adapters;
//! the session only ever sees the trait objects.

use std::sync::Arc;

use super::types::{Args, EventDetails, InvocationDetails, InvocationResult, Kwargs};
use crate::error::WampError;

/// A local procedure endpoint invoked for INVOCATION messages.
///
/// Errors are caught at the dispatch boundary and converted into an
/// ERROR reply to the peer; they never reach the session state machine.
pub trait InvocationHandler: Send + Sync {
    /// Handle one invocation of the registered procedure.
    fn invoke(
        &self,
        args: Args,
        kwargs: Kwargs,
        details: &InvocationDetails,
    ) -> Result<InvocationResult, WampError>;
}

/// A local event subscriber invoked for EVENT messages.
pub trait EventHandler: Send + Sync {
    /// Handle one event published to the subscribed topic.
    fn on_event(&self, args: Args, kwargs: Kwargs, details: &EventDetails);
}

struct FnEndpoint<F>(F);

impl<F> InvocationHandler for FnEndpoint<F>
where
    F: Fn(Args, Kwargs, &InvocationDetails) -> Result<InvocationResult, WampError> + Send + Sync,
{
    fn invoke(
        &self,
        args: Args,
        kwargs: Kwargs,
        details: &InvocationDetails,
    ) -> Result<InvocationResult, WampError> {
        (self.0)(args, kwargs, details)
    }
}

struct FnSubscriber<F>(F);

impl<F> EventHandler for FnSubscriber<F>
where
    F: Fn(Args, Kwargs, &EventDetails) + Send + Sync,
{
    fn on_event(&self, args: Args, kwargs: Kwargs, details: &EventDetails) {
        (self.0)(args, kwargs, details);
    }
}

/// Wrap a closure as a procedure endpoint.
pub fn endpoint_fn<F>(f: F) -> Arc<dyn InvocationHandler>
where
    F: Fn(Args, Kwargs, &InvocationDetails) -> Result<InvocationResult, WampError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnEndpoint(f))
}

/// Wrap a closure as an event subscriber.
pub fn event_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Args, Kwargs, &EventDetails) + Send + Sync + 'static,
{
    Arc::new(FnSubscriber(f))
}
