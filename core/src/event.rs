//! Wire events exchanged with the message bus.
//!
//! Both directions use JSON bodies with camelCase field names:
//!
//! - `order.created` (outbound): `{orderId, productId, quantity, status, createdAt, requestId}`
//! - `order.updated` (inbound): `{orderId, productId, status, updatedAt, requestId}`
//!
//! Unknown fields in inbound messages are ignored. A missing `requestId`
//! decodes as an empty id and is replaced by [`RequestId::PLACEHOLDER`].

use crate::order::{Order, OrderId, OrderStatus, ProductId, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing key for order-creation events.
pub const ORDER_CREATED: &str = "order.created";

/// Routing key for externally decided status transitions.
pub const ORDER_UPDATED: &str = "order.updated";

/// Errors decoding a wire payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload was not valid JSON for the expected shape
    #[error("Malformed {kind} payload: {reason}")]
    Malformed {
        /// Which message kind was being decoded
        kind: &'static str,
        /// Parser message
        reason: String,
    },
}

/// Outbound `order.created` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    /// Created order
    pub order_id: OrderId,
    /// Ordered product
    pub product_id: ProductId,
    /// Requested quantity
    pub quantity: i32,
    /// Status at creation (`waiting`)
    pub status: OrderStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Correlation id of the originating request
    pub request_id: RequestId,
}

impl OrderCreatedEvent {
    /// Build the event for a freshly persisted order.
    #[must_use]
    pub fn from_order(order: &Order, quantity: i32, request_id: RequestId) -> Self {
        Self {
            order_id: order.id,
            product_id: order.product_id,
            quantity,
            status: order.status.clone(),
            created_at: order.created_at,
            request_id,
        }
    }

    /// Serialize to the JSON wire body.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Inbound `order.updated` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdatedEvent {
    /// Order to update
    pub order_id: OrderId,
    /// Product whose order list must be refreshed
    pub product_id: ProductId,
    /// New status
    pub status: OrderStatus,
    /// When the upstream decided the transition (informational)
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Correlation id, empty when absent
    #[serde(default)]
    pub request_id: RequestId,
}

impl OrderUpdatedEvent {
    /// Decode an `order.updated` body.
    ///
    /// The request id is normalised: an absent or empty id becomes
    /// [`RequestId::PLACEHOLDER`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the body is not valid JSON or a
    /// required field is missing.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut event: Self =
            serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed {
                kind: ORDER_UPDATED,
                reason: e.to_string(),
            })?;
        event.request_id = std::mem::take(&mut event.request_id).or_placeholder();
        Ok(event)
    }
}
