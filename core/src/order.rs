//! Order domain types.
//!
//! Orders are created once by the orchestrator, priced against a product
//! snapshot, and afterwards only their status changes (driven by
//! `order.updated` events). Identifiers are the storage's integer keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage-assigned order identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i32);

impl OrderId {
    /// Creates a new `OrderId`
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the inner value
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog product identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i32);

impl ProductId {
    /// Creates a new `ProductId`
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the inner value
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order status.
///
/// The set is open: orders start as [`OrderStatus::WAITING`] and afterwards
/// hold whatever status an `order.updated` event delivers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderStatus(String);

impl OrderStatus {
    /// Status assigned to every newly created order.
    pub const WAITING: &'static str = "waiting";

    /// Creates a status from any string
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// The initial `waiting` status
    #[must_use]
    pub fn waiting() -> Self {
        Self(Self::WAITING.to_string())
    }

    /// Returns the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation identifier threaded through a request and its side effects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Substituted when an inbound message carries no request id.
    pub const PLACEHOLDER: &'static str = "no-request-id";

    /// Creates a request id from a string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `self`, or the placeholder when empty.
    #[must_use]
    pub fn or_placeholder(self) -> Self {
        if self.is_empty() {
            Self(Self::PLACEHOLDER.to_string())
        } else {
            self
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Storage-assigned identifier
    pub id: OrderId,
    /// Ordered product
    pub product_id: ProductId,
    /// `quantity × unit price` at creation time
    pub total_price: f64,
    /// Current status
    pub status: OrderStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// An order that has not been persisted yet (no id).
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    /// Ordered product
    pub product_id: ProductId,
    /// Computed total price
    pub total_price: f64,
    /// Initial status
    pub status: OrderStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Price an order against a product snapshot.
    ///
    /// The result always carries the `waiting` status. Zero or negative
    /// quantities are accepted as-is; validation belongs to the caller.
    #[must_use]
    pub fn priced(product: &ProductSnapshot, quantity: i32, created_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id,
            total_price: total_price(quantity, product.price),
            status: OrderStatus::waiting(),
            created_at,
        }
    }

    /// Attach the storage-assigned id.
    #[must_use]
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            product_id: self.product_id,
            total_price: self.total_price,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Total price of `quantity` units.
///
/// Plain `f64` multiplication: no rounding and no currency policy.
#[must_use]
pub fn total_price(quantity: i32, unit_price: f64) -> f64 {
    f64::from(quantity) * unit_price
}

/// Catalog projection of a product, as served by the product service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product identifier
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: f64,
    /// Available stock (informational, not enforced)
    pub qty: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(price: f64) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::new(1),
            name: "Widget".to_string(),
            price,
            qty: 10,
        }
    }

    #[test]
    fn priced_order_multiplies_quantity_by_unit_price() {
        let new_order = NewOrder::priced(&product(50.0), 3, Utc::now());
        assert_eq!(new_order.total_price, 150.0);
        assert_eq!(new_order.status.as_str(), OrderStatus::WAITING);
        assert_eq!(new_order.product_id, ProductId::new(1));
    }

    #[test]
    fn zero_and_negative_quantities_are_not_corrected() {
        assert_eq!(NewOrder::priced(&product(50.0), 0, Utc::now()).total_price, 0.0);
        assert_eq!(NewOrder::priced(&product(50.0), -2, Utc::now()).total_price, -100.0);
    }

    #[test]
    fn order_serializes_with_camel_case_fields() {
        let order = NewOrder::priced(&product(2.5), 2, Utc::now()).into_order(OrderId::new(7));
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["productId"], 1);
        assert_eq!(json["totalPrice"], 5.0);
        assert_eq!(json["status"], "waiting");
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn request_id_placeholder_only_replaces_empty() {
        assert_eq!(RequestId::default().or_placeholder().as_str(), RequestId::PLACEHOLDER);
        assert_eq!(RequestId::new("abc").or_placeholder().as_str(), "abc");
    }

    #[test]
    fn product_snapshot_ignores_unknown_fields() {
        let snapshot: ProductSnapshot = serde_json::from_str(
            r#"{"id":3,"name":"Gadget","price":9.5,"qty":4,"createdAt":"2025-01-01"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.id, ProductId::new(3));
        assert_eq!(snapshot.price, 9.5);
    }

    proptest! {
        #[test]
        fn total_matches_float_multiplication(quantity in 1..10_000i32, price in 0.0..10_000.0f64) {
            let order = NewOrder::priced(&product(price), quantity, Utc::now());
            prop_assert_eq!(order.total_price, f64::from(quantity) * price);
        }
    }
}
