//! Redis cache backend for the order pipeline.
//!
//! [`RedisCache`] implements [`Cache`] with a multiplexed
//! `redis::aio::ConnectionManager`, which reconnects on its own. Values are
//! raw bytes; every write uses `SETEX` so entries always carry a TTL.
//!
//! # Example
//!
//! ```no_run
//! use orderflow_core::cache::Cache;
//! use orderflow_redis::RedisCache;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCache::connect("redis://localhost:6379").await?;
//! cache.set("product:1", b"{}".to_vec(), Duration::from_secs(300)).await?;
//! assert!(cache.get("product:1").await?.is_some());
//! # Ok(())
//! # }
//! ```

use orderflow_core::cache::{Cache, CacheError, CacheFuture};
use orderflow_core::redact_url;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Redis-backed cache.
///
/// Cheap to clone; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    connection_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {e}")))?;

        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {e}")))?;

        tracing::info!(url = %redact_url(url), "Connected to Redis");
        Ok(Self { connection_manager })
    }

    /// Round-trip a `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the server does not answer.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis PING failed: {e}")))?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Backend(format!("Unexpected PING reply: {pong}")))
        }
    }
}

/// Seconds for `SETEX`, which rejects zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> CacheFuture<'_, Option<Vec<u8>>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.connection_manager.clone();
            let value: Option<Vec<u8>> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(format!("Redis GET failed: {e}")))?;

            tracing::trace!(key = %key, hit = value.is_some(), "Cache GET");
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.connection_manager.clone();
            let ttl_seconds = ttl_seconds(ttl);

            redis::cmd("SETEX")
                .arg(&key)
                .arg(ttl_seconds)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(format!("Redis SETEX failed: {e}")))?;

            tracing::trace!(key = %key, ttl_seconds, "Cache SET");
            Ok(())
        })
    }
}
