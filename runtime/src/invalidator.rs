//! Batched order-list cache invalidation.
//!
//! Order creations and status updates arrive in bursts for the same product.
//! Instead of re-reading storage per signal, one background loop collects
//! product ids into a dirty set and rewrites each `orders:product:{id}`
//! entry once per tick:
//!
//! ```text
//! submit(p) ──try_send──► [bounded queue] ──► dirty: {p1, p2, ...}
//!                                                  │
//!                         tick / queue closed ─────┤
//!                                                  ▼
//!                                for p in dirty: storage ──► cache.set
//! ```
//!
//! The dirty set is owned by the loop task alone. Closing the queue makes the
//! loop drain what is buffered, flush one last time and exit.

use crate::PipelineConfig;
use crate::metrics::{InvalidationMetrics, PipelineMetrics, QUEUE_INVALIDATION};
use orderflow_core::cache::{Cache, ORDER_LIST_TTL, order_list_key};
use orderflow_core::order::{Order, ProductId};
use orderflow_core::storage::OrderStorage;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;

/// Shortest tick the loop accepts; `tokio::time::interval` rejects zero.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Rewrites order-list cache entries from storage.
#[derive(Clone)]
pub(crate) struct OrderListRefresher {
    storage: Arc<dyn OrderStorage>,
    cache: Arc<dyn Cache>,
}

impl OrderListRefresher {
    pub(crate) fn new(storage: Arc<dyn OrderStorage>, cache: Arc<dyn Cache>) -> Self {
        Self { storage, cache }
    }

    /// Re-read a product's orders and overwrite the cached list.
    async fn refresh(&self, product_id: ProductId) {
        match self.storage.orders_by_product(product_id).await {
            Ok(orders) => write_order_list(self.cache.as_ref(), product_id, &orders).await,
            Err(e) => {
                tracing::warn!(
                    product_id = %product_id,
                    error = %e,
                    "Failed to read orders for cache refresh"
                );
            }
        }
    }
}

/// Best-effort write of a product's order list. Failures are logged only.
pub(crate) async fn write_order_list(cache: &dyn Cache, product_id: ProductId, orders: &[Order]) {
    let payload = match serde_json::to_vec(orders) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(product_id = %product_id, error = %e, "Failed to encode order list");
            return;
        }
    };

    if let Err(e) = cache
        .set(&order_list_key(product_id), payload, ORDER_LIST_TTL)
        .await
    {
        tracing::warn!(product_id = %product_id, error = %e, "Failed to cache order list");
    }
}

/// Handle to the invalidation loop.
pub struct CacheInvalidator {
    sender: RwLock<Option<mpsc::Sender<ProductId>>>,
    refresher: OrderListRefresher,
    tracker: TaskTracker,
}

impl CacheInvalidator {
    /// Start the loop.
    ///
    /// A tick shorter than one millisecond is raised to one millisecond.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(
        storage: Arc<dyn OrderStorage>,
        cache: Arc<dyn Cache>,
        config: &PipelineConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.invalidation_queue_capacity.max(1));
        let refresher = OrderListRefresher::new(storage, cache);
        let tracker = TaskTracker::new();

        let tick = config.invalidation_tick.max(MIN_TICK);
        tracker.spawn(run(receiver, refresher.clone(), tick));

        Self {
            sender: RwLock::new(Some(sender)),
            refresher,
            tracker,
        }
    }

    /// Mark a product's order list dirty without blocking.
    ///
    /// When the queue is full the product is refreshed immediately from a
    /// tracked task. After [`close`](Self::close) has started, the signal is
    /// logged and dropped.
    pub fn submit(&self, product_id: ProductId) {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            tracing::warn!(product_id = %product_id, "Invalidator is closed, dropping signal");
            PipelineMetrics::record_rejected(QUEUE_INVALIDATION);
            return;
        };

        match sender.try_send(product_id) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(product_id)) => {
                tracing::debug!(product_id = %product_id, "Invalidation queue full, refreshing directly");
                PipelineMetrics::record_overflow(QUEUE_INVALIDATION);
                let refresher = self.refresher.clone();
                self.tracker.spawn(async move {
                    refresher.refresh(product_id).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(product_id)) => {
                tracing::warn!(product_id = %product_id, "Invalidation loop is gone, dropping signal");
                PipelineMetrics::record_rejected(QUEUE_INVALIDATION);
            }
        }
    }

    /// Stop accepting signals, flush everything received so far and wait for
    /// the loop and any overflow refreshes to finish.
    pub async fn close(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("Cache invalidator flushed and stopped");
    }
}

async fn run(mut receiver: mpsc::Receiver<ProductId>, refresher: OrderListRefresher, tick: Duration) {
    let mut dirty: HashSet<ProductId> = HashSet::new();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(product_id) => {
                    dirty.insert(product_id);
                }
                None => {
                    flush(&refresher, &mut dirty).await;
                    break;
                }
            },
            _ = ticker.tick() => flush(&refresher, &mut dirty).await,
        }
    }
    tracing::trace!("Invalidation loop stopped");
}

async fn flush(refresher: &OrderListRefresher, dirty: &mut HashSet<ProductId>) {
    if dirty.is_empty() {
        return;
    }

    let started = Instant::now();
    let products = dirty.len();
    for product_id in dirty.drain() {
        refresher.refresh(product_id).await;
    }
    tracing::debug!(products, "Flushed order-list invalidations");
    InvalidationMetrics::record_flush(products, started.elapsed());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use orderflow_core::order::{NewOrder, OrderStatus};
    use orderflow_testing::{InMemoryCache, InMemoryOrderStore, test_clock};
    use orderflow_core::environment::Clock;

    const TICK: Duration = Duration::from_millis(1000);

    async fn store_with_orders(products: &[i32]) -> InMemoryOrderStore {
        let store = InMemoryOrderStore::new();
        for &product in products {
            store
                .create_order(NewOrder {
                    product_id: ProductId::new(product),
                    total_price: 10.0,
                    status: OrderStatus::waiting(),
                    created_at: test_clock().now(),
                })
                .await
                .unwrap();
        }
        store
    }

    fn spawn(store: &InMemoryOrderStore, cache: &InMemoryCache, capacity: usize) -> CacheInvalidator {
        let config = PipelineConfig::default()
            .with_invalidation_queue_capacity(capacity)
            .with_invalidation_tick(TICK);
        CacheInvalidator::spawn(Arc::new(store.clone()), Arc::new(cache.clone()), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_for_one_product_is_coalesced_per_tick() {
        let store = store_with_orders(&[1]).await;
        let cache = InMemoryCache::new();
        let invalidator = spawn(&store, &cache, 1000);

        for _ in 0..50 {
            invalidator.submit(ProductId::new(1));
        }
        tokio::time::sleep(TICK + Duration::from_millis(100)).await;

        assert_eq!(store.read_count(), 1);
        assert_eq!(cache.write_count(&order_list_key(ProductId::new(1))), 1);
        assert_eq!(cache.ttl(&order_list_key(ProductId::new(1))), Some(ORDER_LIST_TTL));

        invalidator.close().await;
        // Nothing dirty was left for the final flush.
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_refreshed_before_the_tick() {
        let store = store_with_orders(&[1]).await;
        let cache = InMemoryCache::new();
        let invalidator = spawn(&store, &cache, 1000);

        invalidator.submit(ProductId::new(1));
        tokio::time::sleep(TICK / 2).await;
        assert_eq!(store.read_count(), 0);

        tokio::time::sleep(TICK).await;
        assert_eq!(store.read_count(), 1);
        invalidator.close().await;
    }

    #[tokio::test]
    async fn close_flushes_every_pending_signal() {
        let store = store_with_orders(&[1, 2, 3]).await;
        let cache = InMemoryCache::new();
        let invalidator = spawn(&store, &cache, 1000);

        for product in [1, 2, 3, 2, 1] {
            invalidator.submit(ProductId::new(product));
        }
        invalidator.close().await;

        for product in [1, 2, 3] {
            let key = order_list_key(ProductId::new(product));
            let orders: Vec<Order> = serde_json::from_slice(&cache.value(&key).unwrap()).unwrap();
            assert_eq!(orders.len(), 1);
            assert_eq!(cache.write_count(&key), 1);
        }
    }

    #[tokio::test]
    async fn full_queue_refreshes_directly() {
        let store = store_with_orders(&[1, 2, 3]).await;
        let cache = InMemoryCache::new();
        let invalidator = spawn(&store, &cache, 1);

        for product in [1, 2, 3] {
            invalidator.submit(ProductId::new(product));
        }
        invalidator.close().await;

        for product in [1, 2, 3] {
            assert!(cache.value(&order_list_key(ProductId::new(product))).is_some());
        }
    }

    #[tokio::test]
    async fn signals_after_close_are_dropped() {
        let store = store_with_orders(&[1]).await;
        let cache = InMemoryCache::new();
        let invalidator = spawn(&store, &cache, 10);

        invalidator.close().await;
        invalidator.submit(ProductId::new(1));

        assert_eq!(store.read_count(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn zero_tick_still_flushes_on_close() {
        let store = store_with_orders(&[1]).await;
        let cache = InMemoryCache::new();
        let config = PipelineConfig::default().with_invalidation_tick(Duration::ZERO);
        let invalidator =
            CacheInvalidator::spawn(Arc::new(store.clone()), Arc::new(cache.clone()), &config);

        invalidator.submit(ProductId::new(1));
        invalidator.close().await;

        assert!(cache.value(&order_list_key(ProductId::new(1))).is_some());
    }

    #[tokio::test]
    async fn storage_failure_leaves_cache_untouched() {
        let store = store_with_orders(&[1]).await;
        store.set_failing(true);
        let cache = InMemoryCache::new();
        let invalidator = spawn(&store, &cache, 10);

        invalidator.submit(ProductId::new(1));
        invalidator.close().await;

        assert!(cache.is_empty());
    }
}
