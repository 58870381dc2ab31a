//! Message bus abstraction for cross-service events.
//!
//! The order service publishes `order.created` and consumes `order.updated`
//! over a topic exchange. This module defines the [`MessageBus`] trait, the
//! connection state machine every implementation follows, and the fault
//! boundary used by delivery loops.
//!
//! # Connection lifecycle
//!
//! ```text
//!                 Connect          Established
//!  Disconnected ──────────► Connecting ──────────► Connected
//!       ▲  │                    │ Failed               │
//!       │  │ Reconnect          ▼                      │ Lost
//!       │  └──────────► Reconnecting ◄── Failed        │
//!       │                    │  Established            │
//!       │                    └──────────► Connected    │
//!       └──────────────────────────────────────────────┘
//!
//!  any state ── Close ──► Closed (terminal)
//! ```
//!
//! # Delivery semantics
//!
//! - **At-least-once**: handlers may see the same message more than once
//! - **One at a time per queue**: a subscription's handler is never run concurrently
//! - **Fault boundary**: a handler that fails or panics gets its message
//!   negatively acknowledged and requeued; the delivery loop keeps going
//!
//! # Implementations
//!
//! - `ResilientBus` (in `orderflow-rabbitmq`): AMQP 0.9.1 with auto-reconnect
//! - `InMemoryBus` (in `orderflow-testing`): in-process routing for tests

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No live channel. Callers must not wait for reconnection.
    #[error("Bus is not connected")]
    NotConnected,

    /// The bus was closed and will not reconnect
    #[error("Bus is closed")]
    Closed,

    /// Failed to establish a connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker rejected or failed a publish
    #[error("Publish failed for routing key '{routing_key}': {reason}")]
    PublishFailed {
        /// The routing key that failed
        routing_key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to declare, bind or consume the subscriber queue
    #[error("Subscription failed for routing key '{routing_key}': {reason}")]
    SubscriptionFailed {
        /// The routing key that failed
        routing_key: String,
        /// The reason for failure
        reason: String,
    },
}

/// Connection state of a bus client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Channel is live; publishes are accepted
    Connected,
    /// Connection was lost and the watcher is retrying
    Reconnecting,
    /// `close()` was called; terminal
    Closed,
}

impl ConnectionState {
    /// Whether publishes are accepted in this state.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Apply a lifecycle event.
    ///
    /// `Close` is accepted from every state, including `Closed`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the event makes no sense in the
    /// current state (for example any reconnect attempt after `Closed`).
    pub const fn on(self, event: LinkEvent) -> Result<Self, InvalidTransition> {
        use ConnectionState as S;
        use LinkEvent as E;

        match (self, event) {
            (_, E::Close) => Ok(S::Closed),
            (S::Disconnected, E::Connect) => Ok(S::Connecting),
            (S::Disconnected, E::Reconnect) => Ok(S::Reconnecting),
            (S::Connecting | S::Reconnecting, E::Established) => Ok(S::Connected),
            (S::Connecting, E::Failed) => Ok(S::Disconnected),
            (S::Reconnecting, E::Failed) => Ok(S::Reconnecting),
            (S::Connected, E::Lost) => Ok(S::Disconnected),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle events driving [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Initial dial
    Connect,
    /// Watcher starts a retry after a loss
    Reconnect,
    /// Connection and exchange declaration succeeded
    Established,
    /// A dial attempt failed
    Failed,
    /// The broker connection dropped
    Lost,
    /// Client shutdown
    Close,
}

/// A lifecycle event that is not valid in the current state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid connection transition: {event:?} while {from}")]
pub struct InvalidTransition {
    /// State the event was applied to
    pub from: ConnectionState,
    /// Rejected event
    pub event: LinkEvent,
}

/// Error returned by a [`MessageHandler`] to request redelivery.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Create a handler error from any message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Boxed future returned by [`MessageHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Receives message bodies for a subscription.
pub trait MessageHandler: Send + Sync {
    /// Process one message body.
    ///
    /// # Errors
    ///
    /// Returning an error causes the message to be requeued.
    fn handle(&self, payload: Vec<u8>) -> HandlerFuture<'_>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
struct FnHandler<F>(F);

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, payload: Vec<u8>) -> HandlerFuture<'_> {
        Box::pin((self.0)(payload))
    }
}

/// Wrap an async closure as a shareable handler.
///
/// # Example
///
/// ```
/// use orderflow_core::bus::{handler_fn, MessageHandler};
///
/// let handler = handler_fn(|payload: Vec<u8>| async move {
///     println!("received {} bytes", payload.len());
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// What the delivery loop does with a message after the handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Positive acknowledgement
    Ack,
    /// Negative acknowledgement with requeue
    Requeue,
}

/// Run a handler inside the fault boundary.
///
/// Success maps to [`Disposition::Ack`]. An error or a panic (raised while
/// building the future or while polling it) maps to [`Disposition::Requeue`].
/// Nothing escapes to the caller, so the delivery loop survives any handler.
pub async fn dispatch(handler: &dyn MessageHandler, routing_key: &str, payload: Vec<u8>) -> Disposition {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(payload))) {
        Ok(future) => future,
        Err(panic) => {
            tracing::error!(
                routing_key = %routing_key,
                panic = %panic_message(panic.as_ref()),
                "Handler panicked, requeueing message"
            );
            return Disposition::Requeue;
        }
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => Disposition::Ack,
        Ok(Err(e)) => {
            tracing::warn!(
                routing_key = %routing_key,
                error = %e,
                "Handler failed, requeueing message"
            );
            Disposition::Requeue
        }
        Err(panic) => {
            tracing::error!(
                routing_key = %routing_key,
                panic = %panic_message(panic.as_ref()),
                "Handler panicked, requeueing message"
            );
            Disposition::Requeue
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Boxed future returned by [`MessageBus`] methods.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BusError>> + Send + 'a>>;

/// Trait for message bus implementations.
///
/// All operations are safe for concurrent use. Uses explicit boxed futures
/// so the pipeline can hold `Arc<dyn MessageBus>`.
pub trait MessageBus: Send + Sync {
    /// Publish a JSON body under a routing key.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotConnected`] immediately when no live channel
    /// exists, [`BusError::Closed`] after `close()`, or
    /// [`BusError::PublishFailed`] if the broker rejects the message.
    fn publish(&self, routing_key: &str, payload: Vec<u8>) -> BusFuture<'_, ()>;

    /// Bind a durable per-service queue to a routing key and start delivering
    /// its messages to `handler`, one at a time.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotConnected`] when no live channel exists, or
    /// [`BusError::SubscriptionFailed`] if the queue cannot be set up.
    fn subscribe(&self, routing_key: &str, handler: Arc<dyn MessageHandler>) -> BusFuture<'_, ()>;

    /// Stop every delivery loop and forget all subscriptions.
    ///
    /// Resolves once messages already handed to a handler are settled.
    /// Publishing keeps working; later `subscribe` calls fail with
    /// [`BusError::Closed`].
    ///
    /// # Errors
    ///
    /// Implementations may report failures cancelling broker consumers.
    fn stop_consuming(&self) -> BusFuture<'_, ()>;

    /// Close the connection. No reconnect is attempted afterwards.
    ///
    /// # Errors
    ///
    /// Implementations may report failures closing the underlying connection.
    fn close(&self) -> BusFuture<'_, ()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn initial_connect_path() {
        let state = ConnectionState::Disconnected
            .on(LinkEvent::Connect)
            .and_then(|s| s.on(LinkEvent::Established))
            .unwrap();
        assert_eq!(state, ConnectionState::Connected);
        assert!(state.is_connected());
    }

    #[test]
    fn loss_and_recovery_path() {
        let mut state = ConnectionState::Connected;
        for event in [LinkEvent::Lost, LinkEvent::Reconnect, LinkEvent::Failed, LinkEvent::Failed] {
            state = state.on(event).unwrap();
        }
        assert_eq!(state, ConnectionState::Reconnecting);
        assert_eq!(state.on(LinkEvent::Established).unwrap(), ConnectionState::Connected);
    }

    #[test]
    fn failed_first_dial_returns_to_disconnected() {
        let state = ConnectionState::Connecting.on(LinkEvent::Failed).unwrap();
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn closed_is_terminal() {
        let closed = ConnectionState::Reconnecting.on(LinkEvent::Close).unwrap();
        assert!(closed.is_closed());

        for event in [LinkEvent::Connect, LinkEvent::Reconnect, LinkEvent::Established, LinkEvent::Lost] {
            let err = closed.on(event).unwrap_err();
            assert_eq!(err.from, ConnectionState::Closed);
        }
        assert_eq!(closed.on(LinkEvent::Close).unwrap(), ConnectionState::Closed);
    }

    #[test]
    fn lost_is_only_valid_when_connected() {
        assert!(ConnectionState::Disconnected.on(LinkEvent::Lost).is_err());
        assert!(ConnectionState::Reconnecting.on(LinkEvent::Lost).is_err());
    }

    #[test]
    fn dispatch_acks_on_success() {
        let handler = handler_fn(|_| async { Ok(()) });
        let disposition = tokio_test::block_on(dispatch(handler.as_ref(), "k", vec![]));
        assert_eq!(disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn dispatch_requeues_on_error() {
        let handler = handler_fn(|_| async { Err(HandlerError::new("db down")) });
        assert_eq!(dispatch(handler.as_ref(), "k", vec![]).await, Disposition::Requeue);
    }

    #[tokio::test]
    async fn dispatch_survives_panicking_future() {
        let handler = handler_fn(|payload: Vec<u8>| async move {
            if payload.is_empty() {
                panic!("boom");
            }
            Ok(())
        });
        assert_eq!(dispatch(handler.as_ref(), "k", vec![]).await, Disposition::Requeue);
        assert_eq!(dispatch(handler.as_ref(), "k", vec![1]).await, Disposition::Ack);
    }

    struct PanicsEagerly;

    impl MessageHandler for PanicsEagerly {
        fn handle(&self, _payload: Vec<u8>) -> HandlerFuture<'_> {
            panic!("panicked before returning a future")
        }
    }

    #[tokio::test]
    async fn dispatch_survives_eager_panic() {
        assert_eq!(dispatch(&PanicsEagerly, "k", vec![]).await, Disposition::Requeue);
    }
}
