//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report.
#[derive(Debug, Serialize)]
pub struct Readiness {
    /// `ready` or `unavailable`
    pub status: &'static str,
    /// Bus connection state, e.g. `connected` or `reconnecting`
    pub bus: String,
}

/// Readiness check based on the bus connection.
///
/// # Status Codes
///
/// - 200 OK: the bus is connected
/// - 503 Service Unavailable: any other bus state
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Response
///
/// ```json
/// { "status": "ready", "bus": "connected" }
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let bus_state = state.bus.state();

    let (status, label) = if bus_state.is_connected() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(Readiness {
            status: label,
            bus: bus_state.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
