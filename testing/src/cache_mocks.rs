//! In-memory cache.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use orderflow_core::cache::{Cache, CacheError, CacheFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, (Vec<u8>, Duration)>,
    writes: HashMap<String, usize>,
}

/// `HashMap`-backed cache.
///
/// Entries never expire; the TTL each write asked for is recorded so tests
/// can assert on it. Writes are counted per key, which is how coalescing
/// and cache-aside behavior are observed.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    state: Arc<RwLock<CacheState>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`CacheError::Connection`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Store raw bytes without counting a write (test setup).
    pub fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.state
            .write()
            .unwrap()
            .entries
            .insert(key.to_string(), (value.into(), Duration::ZERO));
    }

    /// Current value of a key
    #[must_use]
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.state.read().unwrap().entries.get(key).map(|(v, _)| v.clone())
    }

    /// TTL requested by the last write to a key
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.state.read().unwrap().entries.get(key).map(|(_, ttl)| *ttl)
    }

    /// Number of `set` calls for a key
    #[must_use]
    pub fn write_count(&self, key: &str) -> usize {
        self.state.read().unwrap().writes.get(key).copied().unwrap_or(0)
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap().entries.is_empty()
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Connection("in-memory cache is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> CacheFuture<'_, Option<Vec<u8>>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check_available()?;
            Ok(self.value(&key))
        })
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().unwrap();
            *state.writes.entry(key.clone()).or_insert(0) += 1;
            state.entries.insert(key, (value, ttl));
            Ok(())
        })
    }
}
