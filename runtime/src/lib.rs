//! # Orderflow Runtime
//!
//! The order pipeline: everything between the HTTP boundary and the
//! backends that involves concurrency, buffering or failure handling.
//!
//! ## Components
//!
//! - [`OrderService`]: the orchestrator. Prices and persists orders, serves
//!   cache-aside reads, applies inbound status updates.
//! - [`publisher::PublisherPool`]: fixed pool of workers publishing
//!   `order.created` events from a bounded queue.
//! - [`invalidator::CacheInvalidator`]: single loop coalescing per-product
//!   order-list refreshes over a tick interval.
//! - [`inbound::OrderUpdatedHandler`]: bus handler for `order.updated`.
//!
//! ## Write path
//!
//! ```text
//! create_order ──► product (cache-aside) ──► storage.create_order ──► Order
//!                                                    │
//!                          ┌─────────────────────────┴───────────┐
//!                          ▼ try_send                            ▼ try_send
//!                   invalidation queue                     publish queue
//!                          │ (full: tracked task)                │ (full: tracked task)
//!                          ▼                                     ▼
//!                  dirty set ── tick ──► refresh list     N workers ──► bus
//! ```
//!
//! Steps after the storage write never block the caller and never fail the
//! request. [`OrderService::close`] drains both queues and waits for every
//! tracked task before returning.

use orderflow_core::bus::BusError;
use orderflow_core::event::DecodeError;
use orderflow_core::order::ProductId;
use orderflow_core::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

pub mod inbound;
pub mod invalidator;
pub mod metrics;
pub mod publisher;
mod service;

pub use inbound::OrderUpdatedHandler;
pub use service::{Collaborators, OrderService};

/// Errors surfaced by the order pipeline.
#[derive(Error, Debug)]
pub enum OrderError {
    /// The catalog could not resolve the product (miss, non-success status
    /// or undecodable body). Nothing was persisted.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// Persistence or read failure against the source of truth
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The bus has no live channel
    #[error("Message bus is not connected")]
    NotConnected,

    /// Any other bus failure
    #[error("Message bus error: {0}")]
    Bus(BusError),

    /// A wire payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl From<BusError> for OrderError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::NotConnected | BusError::Closed => Self::NotConnected,
            other => Self::Bus(other),
        }
    }
}

/// Sizing of the pipeline's background machinery.
///
/// # Example
///
/// ```
/// use orderflow_runtime::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::default()
///     .with_publish_workers(16)
///     .with_invalidation_tick(Duration::from_millis(250));
/// assert_eq!(config.publish_queue_capacity, 1000);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent publisher workers
    pub publish_workers: usize,
    /// Capacity of the outbound event queue
    pub publish_queue_capacity: usize,
    /// Capacity of the invalidation signal queue
    pub invalidation_queue_capacity: usize,
    /// Coalescing window of the invalidator
    pub invalidation_tick: Duration,
}

impl PipelineConfig {
    /// Set the number of publisher workers
    #[must_use]
    pub const fn with_publish_workers(mut self, workers: usize) -> Self {
        self.publish_workers = workers;
        self
    }

    /// Set the outbound event queue capacity
    #[must_use]
    pub const fn with_publish_queue_capacity(mut self, capacity: usize) -> Self {
        self.publish_queue_capacity = capacity;
        self
    }

    /// Set the invalidation queue capacity
    #[must_use]
    pub const fn with_invalidation_queue_capacity(mut self, capacity: usize) -> Self {
        self.invalidation_queue_capacity = capacity;
        self
    }

    /// Set the invalidator tick interval
    #[must_use]
    pub const fn with_invalidation_tick(mut self, tick: Duration) -> Self {
        self.invalidation_tick = tick;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            publish_workers: 100,
            publish_queue_capacity: 1000,
            invalidation_queue_capacity: 1000,
            invalidation_tick: Duration::from_millis(1000),
        }
    }
}
