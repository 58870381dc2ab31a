//! The order orchestrator.

use crate::OrderError;
use crate::PipelineConfig;
use crate::invalidator::{CacheInvalidator, write_order_list};
use crate::metrics::{InboundMetrics, OrderMetrics};
use crate::publisher::PublisherPool;
use orderflow_core::bus::MessageBus;
use orderflow_core::cache::{Cache, PRODUCT_TTL, order_list_key, product_key};
use orderflow_core::catalog::ProductCatalog;
use orderflow_core::environment::{Clock, SystemClock};
use orderflow_core::event::{OrderCreatedEvent, OrderUpdatedEvent};
use orderflow_core::order::{NewOrder, Order, ProductId, ProductSnapshot, RequestId};
use orderflow_core::storage::OrderStorage;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::TaskTracker;

/// External collaborators of the pipeline.
///
/// All of them must tolerate concurrent use; the pipeline adds no locking.
#[derive(Clone)]
pub struct Collaborators {
    /// Source of truth for orders
    pub storage: Arc<dyn OrderStorage>,
    /// Product and order-list cache
    pub cache: Arc<dyn Cache>,
    /// Remote product catalog
    pub catalog: Arc<dyn ProductCatalog>,
    /// Event bus for `order.created`
    pub bus: Arc<dyn MessageBus>,
    /// Time source for creation timestamps
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Bundle collaborators, using the system clock.
    #[must_use]
    pub fn new(
        storage: Arc<dyn OrderStorage>,
        cache: Arc<dyn Cache>,
        catalog: Arc<dyn ProductCatalog>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            storage,
            cache,
            catalog,
            bus,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Order orchestrator.
///
/// Owns the publisher pool, the cache invalidator and a tracker for
/// best-effort cache writes. Construct once and share behind an `Arc`.
///
/// # Example
///
/// ```
/// use orderflow_core::order::{ProductId, ProductSnapshot, RequestId};
/// use orderflow_runtime::{Collaborators, OrderService, PipelineConfig};
/// use orderflow_testing::{InMemoryBus, InMemoryCache, InMemoryOrderStore, StaticCatalog};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = StaticCatalog::new().with_product(ProductSnapshot {
///     id: ProductId::new(1),
///     name: "Widget".to_string(),
///     price: 50.0,
///     qty: 10,
/// });
/// let service = OrderService::start(
///     Collaborators::new(
///         Arc::new(InMemoryOrderStore::new()),
///         Arc::new(InMemoryCache::new()),
///         Arc::new(catalog),
///         Arc::new(InMemoryBus::new()),
///     ),
///     &PipelineConfig::default(),
/// );
///
/// let order = service
///     .create_order(&RequestId::new("req-1"), ProductId::new(1), 3)
///     .await?;
/// assert_eq!(order.total_price, 150.0);
///
/// service.close().await;
/// # Ok(())
/// # }
/// ```
pub struct OrderService {
    storage: Arc<dyn OrderStorage>,
    cache: Arc<dyn Cache>,
    catalog: Arc<dyn ProductCatalog>,
    clock: Arc<dyn Clock>,
    bus: Arc<dyn MessageBus>,
    publisher: PublisherPool,
    invalidator: CacheInvalidator,
    background: TaskTracker,
}

impl OrderService {
    /// Start the pipeline's background workers and return the orchestrator.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(collaborators: Collaborators, config: &PipelineConfig) -> Self {
        let Collaborators {
            storage,
            cache,
            catalog,
            bus,
            clock,
        } = collaborators;

        let publisher = PublisherPool::spawn(Arc::clone(&bus), config);
        let invalidator = CacheInvalidator::spawn(Arc::clone(&storage), Arc::clone(&cache), config);

        tracing::info!(
            publish_workers = config.publish_workers,
            invalidation_tick_ms = u64::try_from(config.invalidation_tick.as_millis()).unwrap_or(u64::MAX),
            "Order pipeline started"
        );

        Self {
            storage,
            cache,
            catalog,
            clock,
            bus,
            publisher,
            invalidator,
            background: TaskTracker::new(),
        }
    }

    /// Price and persist an order, then schedule its side effects.
    ///
    /// The caller waits for the product lookup and the storage write only.
    /// Cache invalidation and the `order.created` event are queued and never
    /// fail the request. Quantity is not validated here.
    ///
    /// # Errors
    ///
    /// - [`OrderError::ProductNotFound`] if the catalog cannot resolve the
    ///   product; nothing is persisted
    /// - [`OrderError::Storage`] if the insert fails
    #[tracing::instrument(skip(self), fields(request_id = %request_id, product_id = %product_id))]
    pub async fn create_order(
        &self,
        request_id: &RequestId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Order, OrderError> {
        let product = self.resolve_product(product_id, request_id).await?;

        let new_order = NewOrder::priced(&product, quantity, self.clock.now());
        let order = self.storage.create_order(new_order).await?;

        tracing::info!(order_id = %order.id, total_price = order.total_price, "Order created");
        OrderMetrics::record_created();

        self.invalidator.submit(product_id);
        self.publisher
            .submit(OrderCreatedEvent::from_order(&order, quantity, request_id.clone()));

        Ok(order)
    }

    /// All orders for a product, cache-aside.
    ///
    /// A cached list that fails to decode is treated as a miss. After a miss
    /// the fresh list is written back with a 600 s TTL; a failed write is
    /// only logged.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Storage`] if storage has to be queried and fails.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_orders_by_product_id(&self, product_id: ProductId) -> Result<Vec<Order>, OrderError> {
        let key = order_list_key(product_id);
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<Order>>(&bytes) {
                Ok(orders) => {
                    tracing::debug!(count = orders.len(), "Order list served from cache");
                    return Ok(orders);
                }
                Err(e) => tracing::debug!(error = %e, "Discarding undecodable cached order list"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Order list cache read failed, using storage"),
        }

        let orders = self.storage.orders_by_product(product_id).await?;
        write_order_list(self.cache.as_ref(), product_id, &orders).await;
        Ok(orders)
    }

    /// Apply an externally decided status transition.
    ///
    /// The storage update is idempotent; the product's order list is marked
    /// for refresh afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Storage`] if the update fails. The message should
    /// then be redelivered.
    #[tracing::instrument(
        skip(self, event),
        fields(order_id = %event.order_id, request_id = %event.request_id)
    )]
    pub async fn apply_status_update(&self, event: &OrderUpdatedEvent) -> Result<(), OrderError> {
        self.storage
            .update_order_status(event.order_id, event.status.clone())
            .await?;

        tracing::info!(status = %event.status, "Order status updated");
        InboundMetrics::record_applied();

        self.invalidator.submit(event.product_id);
        Ok(())
    }

    /// Stop consuming inbound events, drain the publisher queue and the
    /// invalidator, then wait for every outstanding background cache write.
    ///
    /// Consumers stop first so that no status update is applied once the
    /// invalidator no longer accepts signals. Signals submitted before this
    /// call are not lost. Submissions made while or after closing are logged
    /// and dropped. The bus connection is not closed here; it is shared and
    /// owned by the caller.
    pub async fn close(&self) {
        tracing::info!("Closing order pipeline");
        if let Err(e) = self.bus.stop_consuming().await {
            tracing::warn!(error = %e, "Failed to stop inbound consumers");
        }
        self.publisher.close().await;
        self.invalidator.close().await;
        self.background.close();
        self.background.wait().await;
        tracing::info!("Order pipeline closed");
    }

    async fn resolve_product(
        &self,
        product_id: ProductId,
        request_id: &RequestId,
    ) -> Result<ProductSnapshot, OrderError> {
        let key = product_key(product_id);
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<ProductSnapshot>(&bytes) {
                Ok(product) => {
                    OrderMetrics::record_cache_hit();
                    return Ok(product);
                }
                Err(e) => tracing::debug!(error = %e, "Discarding undecodable cached product"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Product cache read failed, using catalog"),
        }

        let started = Instant::now();
        let fetched = self.catalog.fetch_product(product_id, request_id).await;
        OrderMetrics::record_cache_miss(started.elapsed());

        let product = fetched.map_err(|e| {
            tracing::warn!(error = %e, "Catalog lookup failed");
            OrderError::ProductNotFound(product_id)
        })?;

        self.populate_product_cache(key, &product);
        Ok(product)
    }

    fn populate_product_cache(&self, key: String, product: &ProductSnapshot) {
        let payload = match serde_json::to_vec(product) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode product snapshot");
                return;
            }
        };

        let cache = Arc::clone(&self.cache);
        self.background.spawn(async move {
            if let Err(e) = cache.set(&key, payload, PRODUCT_TTL).await {
                tracing::warn!(key = %key, error = %e, "Failed to cache product snapshot");
            }
        });
    }
}
