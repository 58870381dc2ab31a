//! Handler for inbound `order.updated` events.
//!
//! | Outcome | Disposition |
//! |---------|-------------|
//! | applied | ack |
//! | malformed payload | logged, ack (poison messages are not requeued) |
//! | storage failure | nack + requeue |

use crate::metrics::InboundMetrics;
use crate::{OrderError, OrderService};
use orderflow_core::bus::{HandlerError, HandlerFuture, MessageBus, MessageHandler};
use orderflow_core::event::{ORDER_UPDATED, OrderUpdatedEvent};
use std::sync::Arc;

/// Applies `order.updated` messages through the orchestrator.
pub struct OrderUpdatedHandler {
    service: Arc<OrderService>,
}

impl OrderUpdatedHandler {
    /// Create a handler bound to a running pipeline
    #[must_use]
    pub const fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }

    async fn apply(&self, payload: &[u8]) -> Result<(), OrderError> {
        let event = OrderUpdatedEvent::decode(payload)?;
        self.service.apply_status_update(&event).await
    }
}

impl MessageHandler for OrderUpdatedHandler {
    fn handle(&self, payload: Vec<u8>) -> HandlerFuture<'_> {
        Box::pin(async move {
            match self.apply(&payload).await {
                Ok(()) => Ok(()),
                Err(OrderError::Decode(e)) => {
                    tracing::warn!(
                        error = %e,
                        payload_len = payload.len(),
                        "Dropping malformed order.updated message"
                    );
                    InboundMetrics::record_dropped();
                    Ok(())
                }
                Err(e) => Err(HandlerError::new(e.to_string())),
            }
        })
    }
}

/// Subscribe the pipeline to `order.updated`.
///
/// # Errors
///
/// Returns [`OrderError::NotConnected`] if the bus has no live channel, or
/// [`OrderError::Bus`] if the subscription cannot be set up.
pub async fn subscribe(bus: &dyn MessageBus, service: Arc<OrderService>) -> Result<(), OrderError> {
    bus.subscribe(ORDER_UPDATED, Arc::new(OrderUpdatedHandler::new(service)))
        .await?;
    tracing::info!(routing_key = ORDER_UPDATED, "Subscribed to order status updates");
    Ok(())
}
