//! Axum HTTP surface for the order pipeline.
//!
//! The web layer is a thin shell: it validates input, hands off to
//! [`orderflow_runtime::OrderService`], and maps results to HTTP.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | `POST` | `/orders` | [`handlers::create_order`] |
//! | `GET` | `/orders/product/{id}` | [`handlers::orders_by_product`] |
//! | `GET` | `/health` | [`handlers::health_check`] |
//! | `GET` | `/health/ready` | [`handlers::readiness`] |
//!
//! # Request Flow
//!
//! 1. **Request id** assigned or propagated ([`middleware`])
//! 2. **Validate** the body at the boundary
//! 3. **Call** the orchestrator
//! 4. **Map** the result to a response, errors via [`AppError`]

#![allow(clippy::module_name_repetitions)]

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::ReqId;
pub use middleware::{REQUEST_ID_HEADER, request_id_layer};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the service router.
///
/// The request id layer is outermost so the trace span and every handler
/// see the id.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/orders/product/:id", get(handlers::orders_by_product))
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
