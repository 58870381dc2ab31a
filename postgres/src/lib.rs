//! `PostgreSQL` order storage.
//!
//! [`PostgresOrderStore`] implements [`OrderStorage`] over a `sqlx` pool.
//! The pool is shared and thread-safe; the store adds no locking of its own.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE orders (
//!     id          SERIAL PRIMARY KEY,
//!     product_id  INT NOT NULL,
//!     total_price DOUBLE PRECISION NOT NULL,
//!     status      TEXT NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX idx_orders_product_id ON orders(product_id);
//! ```
//!
//! [`PostgresOrderStore::migrate`] creates both idempotently.

use chrono::{DateTime, Utc};
use orderflow_core::order::{NewOrder, Order, OrderId, OrderStatus, ProductId};
use orderflow_core::storage::{OrderStorage, StorageError, StorageFuture};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

/// Pool settings for [`PostgresOrderStore::connect`].
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// Server-side `statement_timeout` applied to every connection
    pub statement_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            statement_timeout: Duration::from_secs(30),
        }
    }
}

/// `PostgreSQL`-backed order storage.
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Open a pool against `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the URL cannot be parsed or
    /// the first connection fails.
    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self, StorageError> {
        let timeout_ms = settings.statement_timeout.as_millis().to_string();
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .options([("statement_timeout", timeout_ms.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!(
            max_connections = settings.max_connections,
            statement_timeout_ms = %timeout_ms,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `orders` table and its product index if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if either statement fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS orders (
                id SERIAL PRIMARY KEY,
                product_id INT NOT NULL,
                total_price DOUBLE PRECISION NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_product_id ON orders(product_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        tracing::debug!("orders schema ready");
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<Order, StorageError> {
        let decode = |e: sqlx::Error| StorageError::Database(e.to_string());
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
        let status: String = row.try_get("status").map_err(decode)?;

        Ok(Order {
            id: OrderId::new(row.try_get("id").map_err(decode)?),
            product_id: ProductId::new(row.try_get("product_id").map_err(decode)?),
            total_price: row.try_get("total_price").map_err(decode)?,
            status: OrderStatus::new(status),
            created_at,
        })
    }
}

impl OrderStorage for PostgresOrderStore {
    fn create_order(&self, order: NewOrder) -> StorageFuture<'_, Order> {
        Box::pin(async move {
            let id: i32 = sqlx::query_scalar(
                r"
                INSERT INTO orders (product_id, total_price, status, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                ",
            )
            .bind(order.product_id.get())
            .bind(order.total_price)
            .bind(order.status.as_str())
            .bind(order.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

            tracing::debug!(order_id = id, product_id = %order.product_id, "Inserted order");
            Ok(order.into_order(OrderId::new(id)))
        })
    }

    fn orders_by_product(&self, product_id: ProductId) -> StorageFuture<'_, Vec<Order>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, product_id, total_price, status, created_at
                FROM orders
                WHERE product_id = $1
                ORDER BY id ASC
                ",
            )
            .bind(product_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

            rows.iter().map(Self::row_to_order).collect()
        })
    }

    fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
                .bind(status.as_str())
                .bind(order_id.get())
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Database(e.to_string()))?;

            if result.rows_affected() == 0 {
                tracing::warn!(order_id = %order_id, status = %status, "Status update matched no order");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_settings_defaults() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 20);
        assert_eq!(settings.statement_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn malformed_url_is_a_connection_error() {
        let result = PostgresOrderStore::connect("definitely not a url", PoolSettings::default()).await;
        assert!(matches!(result, Err(StorageError::Connection(_))));
    }
}
