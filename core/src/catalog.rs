//! Product catalog abstraction.
//!
//! The catalog is a remote, read-mostly service. The pipeline only ever
//! fetches single products by id, forwarding the request id for tracing.

use crate::order::{ProductId, ProductSnapshot, RequestId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors fetching a product from the catalog.
///
/// The orchestrator folds every variant into "product not found"; the
/// variants exist for logging.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// Network failure or timeout
    #[error("Catalog request failed: {0}")]
    RequestFailed(String),

    /// The catalog answered with a non-success status
    #[error("Catalog returned status {status} for product {product_id}")]
    UnexpectedStatus {
        /// Requested product
        product_id: ProductId,
        /// HTTP status code
        status: u16,
    },

    /// The body could not be decoded as a product
    #[error("Catalog response parsing failed: {0}")]
    ResponseParseFailed(String),
}

/// Boxed future returned by [`ProductCatalog::fetch_product`].
pub type CatalogFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProductSnapshot, CatalogError>> + Send + 'a>>;

/// Remote product catalog.
pub trait ProductCatalog: Send + Sync {
    /// Fetch a product snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on transport failure, non-success status,
    /// or an undecodable body.
    fn fetch_product(&self, product_id: ProductId, request_id: &RequestId) -> CatalogFuture<'_>;
}
