//! # Orderflow Testing
//!
//! In-memory collaborators for exercising the order pipeline without
//! Postgres, Redis, `RabbitMQ` or a live catalog.
//!
//! This crate provides:
//! - [`InMemoryOrderStore`]: `BTreeMap`-backed order storage with read counters
//! - [`InMemoryCache`]: TTL-recording cache with per-key write counters
//! - [`StaticCatalog`]: fixed product table that records lookups
//! - [`InMemoryBus`]: in-process bus that routes publishes to subscribers
//! - [`FixedClock`]: deterministic time
//!
//! Every double can be switched into a failing mode so tests can drive the
//! degraded paths (cache down, storage down, bus disconnected).
//!
//! ## Example
//!
//! ```
//! use orderflow_core::order::{ProductId, ProductSnapshot};
//! use orderflow_testing::{InMemoryCache, InMemoryOrderStore, StaticCatalog};
//!
//! let storage = InMemoryOrderStore::new();
//! let cache = InMemoryCache::new();
//! let catalog = StaticCatalog::new().with_product(ProductSnapshot {
//!     id: ProductId::new(1),
//!     name: "Widget".to_string(),
//!     price: 50.0,
//!     qty: 10,
//! });
//! assert!(storage.is_empty());
//! assert!(cache.is_empty());
//! assert_eq!(catalog.fetch_count(), 0);
//! ```

use chrono::{DateTime, Utc};
use orderflow_core::environment::Clock;

mod bus_mocks;
mod cache_mocks;
mod catalog_mocks;
mod storage_mocks;

pub use bus_mocks::InMemoryBus;
pub use cache_mocks::InMemoryCache;
pub use catalog_mocks::StaticCatalog;
pub use storage_mocks::InMemoryOrderStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making order timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use orderflow_testing::mocks::FixedClock;
    /// use orderflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
