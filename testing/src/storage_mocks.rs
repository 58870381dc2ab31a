//! In-memory order storage.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use orderflow_core::order::{NewOrder, Order, OrderId, OrderStatus, ProductId};
use orderflow_core::storage::{OrderStorage, StorageError, StorageFuture};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// `BTreeMap`-backed order storage.
///
/// Ids are assigned sequentially starting at 1, like a `SERIAL` column.
/// Clones share the same data, so a test can keep a handle while the
/// pipeline owns another.
///
/// # Example
///
/// ```
/// use orderflow_core::order::{NewOrder, OrderStatus, ProductId};
/// use orderflow_core::storage::OrderStorage;
/// use orderflow_testing::InMemoryOrderStore;
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryOrderStore::new();
/// let order = store
///     .create_order(NewOrder {
///         product_id: ProductId::new(1),
///         total_price: 10.0,
///         status: OrderStatus::waiting(),
///         created_at: Utc::now(),
///     })
///     .await?;
/// assert_eq!(order.id.get(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<BTreeMap<OrderId, Order>>>,
    next_id: Arc<AtomicI32>,
    reads: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StorageError::Connection`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `orders_by_product` calls served so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Look up an order by id
    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.read().unwrap().get(&id).cloned()
    }

    /// Number of stored orders
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().unwrap().len()
    }

    /// Whether the store holds no orders
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().unwrap().is_empty()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Connection("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl OrderStorage for InMemoryOrderStore {
    fn create_order(&self, order: NewOrder) -> StorageFuture<'_, Order> {
        Box::pin(async move {
            self.check_available()?;
            let id = OrderId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let order = order.into_order(id);
            self.orders.write().unwrap().insert(id, order.clone());
            Ok(order)
        })
    }

    fn orders_by_product(&self, product_id: ProductId) -> StorageFuture<'_, Vec<Order>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.check_available()?;
            Ok(self
                .orders
                .read()
                .unwrap()
                .values()
                .filter(|order| order.product_id == product_id)
                .cloned()
                .collect())
        })
    }

    fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            if let Some(order) = self.orders.write().unwrap().get_mut(&order_id) {
                order.status = status;
            }
            Ok(())
        })
    }
}
