//! Bounded worker pool publishing `order.created` events.
//!
//! A fixed number of workers share one bounded queue. Publishing is network
//! I/O with unpredictable latency, so the pool caps concurrent publishes and
//! keeps that latency off the request path.
//!
//! Failures are logged with the event's request id and dropped. The pool does
//! not retry; recovery is the bus client's reconnect loop.
//!
//! # Saturation
//!
//! When the queue is full, the event is published from a separate task
//! spawned on the pool's [`TaskTracker`]. The caller is never blocked and
//! the event is never dropped; [`PublisherPool::close`] waits for these
//! tasks too.

use crate::PipelineConfig;
use crate::metrics::{PipelineMetrics, QUEUE_PUBLISH};
use orderflow_core::bus::MessageBus;
use orderflow_core::event::{ORDER_CREATED, OrderCreatedEvent};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, mpsc};
use tokio_util::task::TaskTracker;

/// Fixed pool of publisher workers.
pub struct PublisherPool {
    sender: RwLock<Option<mpsc::Sender<OrderCreatedEvent>>>,
    bus: Arc<dyn MessageBus>,
    tracker: TaskTracker,
}

impl PublisherPool {
    /// Start `config.publish_workers` workers.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(bus: Arc<dyn MessageBus>, config: &PipelineConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.publish_queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let tracker = TaskTracker::new();

        let workers = config.publish_workers.max(1);
        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let bus = Arc::clone(&bus);
            tracker.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(event) = next else { break };
                    publish(bus.as_ref(), &event).await;
                }
                tracing::trace!(worker, "Publisher worker stopped");
            });
        }
        tracing::debug!(workers, capacity = config.publish_queue_capacity, "Publisher pool started");

        Self {
            sender: RwLock::new(Some(sender)),
            bus,
            tracker,
        }
    }

    /// Enqueue an event without blocking.
    ///
    /// Falls back to a tracked task when the queue is full. After
    /// [`close`](Self::close) has started, the event is logged and dropped.
    pub fn submit(&self, event: OrderCreatedEvent) {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            tracing::warn!(
                order_id = %event.order_id,
                request_id = %event.request_id,
                "Publisher pool is closed, dropping order.created event"
            );
            PipelineMetrics::record_rejected(QUEUE_PUBLISH);
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::debug!(
                    order_id = %event.order_id,
                    "Publish queue full, publishing from overflow task"
                );
                PipelineMetrics::record_overflow(QUEUE_PUBLISH);
                let bus = Arc::clone(&self.bus);
                self.tracker.spawn(async move {
                    publish(bus.as_ref(), &event).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(
                    order_id = %event.order_id,
                    request_id = %event.request_id,
                    "Publisher workers are gone, dropping order.created event"
                );
                PipelineMetrics::record_rejected(QUEUE_PUBLISH);
            }
        }
    }

    /// Stop accepting events, let the workers drain the queue, and wait for
    /// every worker and overflow task to finish.
    pub async fn close(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("Publisher pool drained");
    }
}

async fn publish(bus: &dyn MessageBus, event: &OrderCreatedEvent) {
    let payload = match event.to_bytes() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(order_id = %event.order_id, error = %e, "Failed to encode order.created event");
            PipelineMetrics::record_publish_failure();
            return;
        }
    };

    match bus.publish(ORDER_CREATED, payload).await {
        Ok(()) => {
            tracing::debug!(
                order_id = %event.order_id,
                request_id = %event.request_id,
                "Published order.created"
            );
            PipelineMetrics::record_published();
        }
        Err(e) => {
            tracing::warn!(
                order_id = %event.order_id,
                request_id = %event.request_id,
                error = %e,
                "Failed to publish order.created, dropping event"
            );
            PipelineMetrics::record_publish_failure();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use orderflow_core::bus::ConnectionState;
    use orderflow_core::order::{OrderId, OrderStatus, ProductId, RequestId};
    use orderflow_testing::{InMemoryBus, test_clock};
    use orderflow_core::environment::Clock;
    use std::time::Duration;

    fn event(id: i32) -> OrderCreatedEvent {
        OrderCreatedEvent {
            order_id: OrderId::new(id),
            product_id: ProductId::new(1),
            quantity: 1,
            status: OrderStatus::waiting(),
            created_at: test_clock().now(),
            request_id: RequestId::new(format!("req-{id}")),
        }
    }

    fn config(workers: usize, capacity: usize) -> PipelineConfig {
        PipelineConfig::default()
            .with_publish_workers(workers)
            .with_publish_queue_capacity(capacity)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_worker_count() {
        let bus = InMemoryBus::new().with_publish_delay(Duration::from_millis(100));
        let pool = PublisherPool::spawn(Arc::new(bus.clone()), &config(4, 100));

        for id in 1..=20 {
            pool.submit(event(id));
        }
        pool.close().await;

        assert_eq!(bus.published(ORDER_CREATED).len(), 20);
        assert!(bus.peak_in_flight() <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_falls_back_without_dropping() {
        let bus = InMemoryBus::new().with_publish_delay(Duration::from_secs(1));
        let pool = PublisherPool::spawn(Arc::new(bus.clone()), &config(1, 1));

        for id in 1..=5 {
            pool.submit(event(id));
        }
        pool.close().await;

        assert_eq!(bus.published_count(), 5);
    }

    #[tokio::test]
    async fn publish_failures_are_dropped_not_retried() {
        let bus = InMemoryBus::new();
        bus.set_state(ConnectionState::Reconnecting);
        let pool = PublisherPool::spawn(Arc::new(bus.clone()), &config(2, 10));

        pool.submit(event(1));
        pool.submit(event(2));
        pool.close().await;

        bus.set_state(ConnectionState::Connected);
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn submissions_after_close_are_rejected() {
        let bus = InMemoryBus::new();
        let pool = PublisherPool::spawn(Arc::new(bus.clone()), &config(2, 10));

        pool.close().await;
        pool.submit(event(1));

        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn published_body_carries_request_id() {
        let bus = InMemoryBus::new();
        let pool = PublisherPool::spawn(Arc::new(bus.clone()), &config(1, 10));

        pool.submit(event(7));
        pool.close().await;

        let bodies = bus.published(ORDER_CREATED);
        let json: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(json["orderId"], 7);
        assert_eq!(json["requestId"], "req-7");
    }
}
