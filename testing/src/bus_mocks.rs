//! In-process message bus.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use orderflow_core::bus::{
    BusError, BusFuture, ConnectionState, Disposition, MessageBus, MessageHandler, dispatch,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct BusState {
    published: Vec<(String, Vec<u8>)>,
    subscriptions: HashMap<String, Vec<Arc<dyn MessageHandler>>>,
    dispositions: Vec<(String, Disposition)>,
    consuming_stopped: bool,
}

/// In-process bus for tests.
///
/// - `publish` records the message and delivers it to every handler
///   subscribed to the routing key, through the same fault boundary the
///   broker-backed bus uses
/// - [`deliver`](Self::deliver) injects a message as if it came from another service
/// - [`set_state`](Self::set_state) simulates connection loss
/// - `stop_consuming` detaches every handler; later deliveries reach nobody
///
/// An optional publish delay plus in-flight tracking lets tests observe how
/// many publishes run concurrently.
#[derive(Clone)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    connection: Arc<Mutex<ConnectionState>>,
    publish_delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl InMemoryBus {
    /// Create a connected bus
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            connection: Arc::new(Mutex::new(ConnectionState::Connected)),
            publish_delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every publish take `delay` before completing
    #[must_use]
    pub const fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    /// Force the connection state (for example `Disconnected`)
    pub fn set_state(&self, state: ConnectionState) {
        *self.connection.lock().unwrap() = state;
    }

    /// Bodies published under a routing key, in order
    #[must_use]
    pub fn published(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Total number of successful publishes
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.state.lock().unwrap().published.len()
    }

    /// Highest number of publishes observed running at once
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Outcomes of every delivery so far
    #[must_use]
    pub fn dispositions(&self) -> Vec<(String, Disposition)> {
        self.state.lock().unwrap().dispositions.clone()
    }

    /// Deliver a message to the subscribers of `routing_key` without
    /// recording it as published. Returns one disposition per handler.
    pub async fn deliver(&self, routing_key: &str, payload: Vec<u8>) -> Vec<Disposition> {
        let handlers = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .get(routing_key)
            .cloned()
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let outcome = dispatch(handler.as_ref(), routing_key, payload.clone()).await;
            self.state
                .lock()
                .unwrap()
                .dispositions
                .push((routing_key.to_string(), outcome));
            outcomes.push(outcome);
        }
        outcomes
    }

    fn require_connected(&self) -> Result<(), BusError> {
        match *self.connection.lock().unwrap() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(BusError::Closed),
            _ => Err(BusError::NotConnected),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for InMemoryBus {
    fn publish(&self, routing_key: &str, payload: Vec<u8>) -> BusFuture<'_, ()> {
        let routing_key = routing_key.to_string();
        Box::pin(async move {
            self.require_connected()?;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.publish_delay.is_zero() {
                tokio::time::sleep(self.publish_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.state
                .lock()
                .unwrap()
                .published
                .push((routing_key.clone(), payload.clone()));
            self.deliver(&routing_key, payload).await;
            Ok(())
        })
    }

    fn subscribe(&self, routing_key: &str, handler: Arc<dyn MessageHandler>) -> BusFuture<'_, ()> {
        let routing_key = routing_key.to_string();
        Box::pin(async move {
            self.require_connected()?;
            let mut state = self.state.lock().unwrap();
            if state.consuming_stopped {
                return Err(BusError::Closed);
            }
            state.subscriptions.entry(routing_key).or_default().push(handler);
            Ok(())
        })
    }

    fn stop_consuming(&self) -> BusFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.consuming_stopped = true;
            state.subscriptions.clear();
            Ok(())
        })
    }

    fn close(&self) -> BusFuture<'_, ()> {
        Box::pin(async move {
            self.set_state(ConnectionState::Closed);
            Ok(())
        })
    }

    fn state(&self) -> ConnectionState {
        *self.connection.lock().unwrap()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use orderflow_core::bus::{HandlerError, handler_fn};

    #[tokio::test]
    async fn publish_routes_to_subscribers() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(
            "order.updated",
            handler_fn(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();

        bus.publish("order.updated", b"{}".to_vec()).await.unwrap();
        bus.publish("order.created", b"{}".to_vec()).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.published("order.updated").len(), 1);
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test]
    async fn disconnected_bus_rejects_publish() {
        let bus = InMemoryBus::new();
        bus.set_state(ConnectionState::Reconnecting);
        assert_eq!(
            bus.publish("k", vec![]).await.unwrap_err(),
            BusError::NotConnected
        );

        bus.close().await.unwrap();
        assert_eq!(bus.publish("k", vec![]).await.unwrap_err(), BusError::Closed);
    }

    #[tokio::test]
    async fn failing_handler_is_requeued() {
        let bus = InMemoryBus::new();
        bus.subscribe("k", handler_fn(|_| async { Err(HandlerError::new("nope")) }))
            .await
            .unwrap();

        assert_eq!(bus.deliver("k", vec![]).await, vec![Disposition::Requeue]);
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn stop_consuming_detaches_handlers_but_keeps_publishing() {
        let bus = InMemoryBus::new();
        bus.subscribe("k", handler_fn(|_| async { Ok(()) })).await.unwrap();

        bus.stop_consuming().await.unwrap();

        assert!(bus.deliver("k", vec![]).await.is_empty());
        bus.publish("k", vec![1]).await.unwrap();
        assert_eq!(bus.published("k").len(), 1);
        assert_eq!(
            bus.subscribe("k", handler_fn(|_| async { Ok(()) })).await.unwrap_err(),
            BusError::Closed
        );
    }
}
