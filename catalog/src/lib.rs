//! HTTP client for the product service.
//!
//! [`HttpProductCatalog`] implements [`ProductCatalog`] with a pooled
//! `reqwest::Client`:
//!
//! ```text
//! GET {base_url}/products/{id}
//! X-Request-ID: {request id}
//! ```
//!
//! A 2xx answer is decoded as a [`ProductSnapshot`]; anything else is an error
//! the orchestrator reports as "product not found".

use orderflow_core::catalog::{CatalogError, CatalogFuture, ProductCatalog};
use orderflow_core::order::{ProductId, ProductSnapshot, RequestId};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Header carrying the correlation id to the product service.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Errors building an [`HttpProductCatalog`].
#[derive(Debug, Error)]
pub enum CatalogBuildError {
    /// No base URL was given
    #[error("Product service base URL is required")]
    MissingBaseUrl,

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Product catalog backed by the product service's REST API.
#[derive(Clone, Debug)]
pub struct HttpProductCatalog {
    client: Client,
    base_url: String,
}

impl HttpProductCatalog {
    /// Client for `base_url` with default timeout and pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogBuildError::Client`] if the TLS backend fails to
    /// initialize.
    pub fn new(base_url: impl Into<String>) -> Result<Self, CatalogBuildError> {
        Self::builder().base_url(base_url).build()
    }

    /// Start building a client.
    #[must_use]
    pub fn builder() -> HttpCatalogBuilder {
        HttpCatalogBuilder::default()
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn product_url(&self, product_id: ProductId) -> String {
        format!("{}/products/{}", self.base_url, product_id)
    }

    async fn fetch(&self, product_id: ProductId, request_id: &RequestId) -> Result<ProductSnapshot, CatalogError> {
        let response = self
            .client
            .get(self.product_url(product_id))
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .send()
            .await
            .map_err(|e| CatalogError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::UnexpectedStatus {
                product_id,
                status: status.as_u16(),
            });
        }

        response
            .json::<ProductSnapshot>()
            .await
            .map_err(|e| CatalogError::ResponseParseFailed(e.to_string()))
    }
}

impl ProductCatalog for HttpProductCatalog {
    fn fetch_product(&self, product_id: ProductId, request_id: &RequestId) -> CatalogFuture<'_> {
        let request_id = request_id.clone();
        Box::pin(async move {
            let result = self.fetch(product_id, &request_id).await;
            if let Err(e) = &result {
                tracing::warn!(
                    request_id = %request_id,
                    product_id = %product_id,
                    error = %e,
                    "Failed to fetch product"
                );
            }
            result
        })
    }
}

/// Builder for [`HttpProductCatalog`].
#[derive(Debug, Clone)]
pub struct HttpCatalogBuilder {
    base_url: Option<String>,
    timeout: Duration,
    pool_max_idle_per_host: usize,
}

impl Default for HttpCatalogBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(2),
            pool_max_idle_per_host: 200,
        }
    }
}

impl HttpCatalogBuilder {
    /// Product service base URL, e.g. `http://localhost:3001`.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Whole-request timeout (default 2s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Idle connections kept per host (default 200).
    #[must_use]
    pub const fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogBuildError::MissingBaseUrl`] without a base URL, or
    /// [`CatalogBuildError::Client`] if `reqwest` cannot build its client.
    pub fn build(self) -> Result<HttpProductCatalog, CatalogBuildError> {
        let base_url = self.base_url.ok_or(CatalogBuildError::MissingBaseUrl)?;
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()
            .map_err(|e| CatalogBuildError::Client(e.to_string()))?;

        Ok(HttpProductCatalog {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog(server: &MockServer) -> HttpProductCatalog {
        HttpProductCatalog::new(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn fetches_product_and_forwards_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/7"))
            .and(header("X-Request-ID", "req-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7,
                "name": "Widget",
                "price": 12.5,
                "qty": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let product = catalog(&server)
            .fetch_product(ProductId::new(7), &RequestId::new("req-42"))
            .await
            .unwrap();

        assert_eq!(product.id, ProductId::new(7));
        assert_eq!(product.name, "Widget");
        assert_eq!(product.price, 12.5);
    }

    #[tokio::test]
    async fn not_found_is_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = catalog(&server)
            .fetch_product(ProductId::new(404), &RequestId::new("r"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CatalogError::UnexpectedStatus { status: 404, product_id } if product_id == ProductId::new(404)
        ));
    }

    #[tokio::test]
    async fn garbage_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = catalog(&server)
            .fetch_product(ProductId::new(1), &RequestId::new("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ResponseParseFailed(_)));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let catalog = HttpProductCatalog::builder()
            .base_url(server.uri())
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let err = catalog
            .fetch_product(ProductId::new(1), &RequestId::new("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::RequestFailed(_)));
    }

    #[test]
    fn builder_requires_base_url() {
        let err = HttpProductCatalog::builder().build().unwrap_err();
        assert!(matches!(err, CatalogBuildError::MissingBaseUrl));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let catalog = HttpProductCatalog::new("http://localhost:3001/").unwrap();
        assert_eq!(catalog.base_url(), "http://localhost:3001");
        assert_eq!(catalog.product_url(ProductId::new(5)), "http://localhost:3001/products/5");
    }
}
