//! Fixed product catalog.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use orderflow_core::catalog::{CatalogError, CatalogFuture, ProductCatalog};
use orderflow_core::order::{ProductId, ProductSnapshot, RequestId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Catalog serving a fixed product table.
///
/// Unknown products answer like an HTTP 404. Every lookup is recorded along
/// with the request id it carried.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductSnapshot>>>,
    lookups: Arc<RwLock<Vec<(ProductId, RequestId)>>>,
}

impl StaticCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product (builder style)
    #[must_use]
    pub fn with_product(self, product: ProductSnapshot) -> Self {
        self.products.write().unwrap().insert(product.id, product);
        self
    }

    /// Number of fetches served so far, hits and misses alike
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.lookups.read().unwrap().len()
    }

    /// Every `(product, request id)` pair fetched, in call order
    #[must_use]
    pub fn lookups(&self) -> Vec<(ProductId, RequestId)> {
        self.lookups.read().unwrap().clone()
    }
}

impl ProductCatalog for StaticCatalog {
    fn fetch_product(&self, product_id: ProductId, request_id: &RequestId) -> CatalogFuture<'_> {
        let request_id = request_id.clone();
        Box::pin(async move {
            self.lookups.write().unwrap().push((product_id, request_id));
            self.products
                .read()
                .unwrap()
                .get(&product_id)
                .cloned()
                .ok_or(CatalogError::UnexpectedStatus {
                    product_id,
                    status: 404,
                })
        })
    }
}
