//! HTTP request handlers.

pub mod health;
pub mod orders;

pub use health::{health_check, readiness};
pub use orders::{create_order, orders_by_product};
