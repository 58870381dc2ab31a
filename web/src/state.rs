//! Application state for Axum handlers.

use orderflow_core::bus::MessageBus;
use orderflow_runtime::OrderService;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// The bus is held separately from the service only so readiness can report
/// its connection state.
#[derive(Clone)]
pub struct AppState {
    /// The order orchestrator
    pub service: Arc<OrderService>,
    /// The shared message bus
    pub bus: Arc<dyn MessageBus>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(service: Arc<OrderService>, bus: Arc<dyn MessageBus>) -> Self {
        Self { service, bus }
    }
}
