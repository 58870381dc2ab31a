//! Key/value cache abstraction.
//!
//! The cache holds derived, reconstructible projections only:
//!
//! | Key | Value | TTL |
//! |-----|-------|-----|
//! | `product:{id}` | JSON [`ProductSnapshot`](crate::order::ProductSnapshot) | 300 s |
//! | `orders:product:{id}` | JSON array of [`Order`](crate::order::Order) | 600 s |
//!
//! A missing key is `Ok(None)`, never an error. Callers treat a value that
//! fails to decode exactly like a missing key.

use crate::order::ProductId;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// TTL of cached product snapshots.
pub const PRODUCT_TTL: Duration = Duration::from_secs(300);

/// TTL of cached per-product order lists.
pub const ORDER_LIST_TTL: Duration = Duration::from_secs(600);

/// Cache key of a product snapshot.
#[must_use]
pub fn product_key(product_id: ProductId) -> String {
    format!("product:{product_id}")
}

/// Cache key of a product's order list.
#[must_use]
pub fn order_list_key(product_id: ProductId) -> String {
    format!("orders:product:{product_id}")
}

/// Errors reported by a cache backend.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Could not reach the backend
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// The backend rejected the command
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Boxed future returned by [`Cache`] methods.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Byte-oriented cache with per-entry TTL.
pub trait Cache: Send + Sync {
    /// Fetch a value. `Ok(None)` when the key is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn get(&self, key: &str) -> CacheFuture<'_, Option<Vec<u8>>>;

    /// Store a value with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'_, ()>;
}
