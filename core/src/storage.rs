//! Order storage abstraction.
//!
//! Storage is the single source of truth for orders. Caches and events are
//! derived from it and may always be rebuilt by re-reading.
//!
//! # Implementations
//!
//! - `PostgresOrderStore` (in `orderflow-postgres`): production
//! - `InMemoryOrderStore` (in `orderflow-testing`): fast, deterministic tests
//!
//! Implementations must tolerate concurrent calls; the pipeline adds no
//! locking of its own around them.

use crate::order::{NewOrder, Order, OrderId, OrderStatus, ProductId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// The backend rejected or failed the query
    #[error("Database error: {0}")]
    Database(String),

    /// Could not obtain a connection
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Boxed future returned by [`OrderStorage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Trait for order persistence.
///
/// Uses explicit boxed futures so the pipeline can hold `Arc<dyn OrderStorage>`.
pub trait OrderStorage: Send + Sync {
    /// Insert a new order and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the insert fails.
    fn create_order(&self, order: NewOrder) -> StorageFuture<'_, Order>;

    /// All orders for a product. Order of the result is backend-defined.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    fn orders_by_product(&self, product_id: ProductId) -> StorageFuture<'_, Vec<Order>>;

    /// Set the status of an order.
    ///
    /// Idempotent: applying the same status twice leaves the same state.
    /// Updating an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the update fails.
    fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> StorageFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_display() {
        let err = StorageError::Database("relation \"orders\" does not exist".to_string());
        assert_eq!(err.to_string(), "Database error: relation \"orders\" does not exist");
    }
}
