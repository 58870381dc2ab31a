//! Order endpoints.
//!
//! ```text
//! POST /orders                 {"productId": 1, "quantity": 2}  → 201 Order
//! GET  /orders/product/{id}                                     → 200 [Order]
//! ```

use crate::{AppError, AppState, ReqId, WebResult};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use orderflow_core::order::{Order, ProductId};
use serde::Deserialize;

/// Body of `POST /orders`.
///
/// `product_id` is accepted as an alias of `productId` for older clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Product to order
    #[serde(alias = "product_id")]
    pub product_id: Option<i64>,
    /// Units to order
    pub quantity: Option<i64>,
}

impl CreateOrderRequest {
    /// Check both fields are present integers of at least 1.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`AppError`] naming the offending field.
    pub fn validate(&self) -> Result<(ProductId, i32), AppError> {
        let product_id = positive("productId", self.product_id)?;
        let quantity = positive("quantity", self.quantity)?;
        Ok((ProductId::new(product_id), quantity))
    }
}

fn positive(field: &str, value: Option<i64>) -> Result<i32, AppError> {
    let value = value.ok_or_else(|| AppError::bad_request(format!("{field} is required")))?;
    i32::try_from(value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| AppError::bad_request(format!("{field} must be an integer of at least 1")))
}

/// Create an order.
///
/// The body is parsed by hand so that empty or malformed JSON is a 400 like
/// every other validation failure.
///
/// # Errors
///
/// - 400 for an empty or invalid body, or out-of-range fields
/// - 404 if the product does not exist
/// - 500 if the order could not be stored
pub async fn create_order(
    State(state): State<AppState>,
    ReqId(request_id): ReqId,
    body: Bytes,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::bad_request("Request body is required"));
    }

    let request: CreateOrderRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Invalid request body: {e}")))?;
    let (product_id, quantity) = request.validate()?;

    let order = state
        .service
        .create_order(&request_id, product_id, quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// List the orders of a product.
///
/// # Errors
///
/// Returns 500 if storage cannot be read.
pub async fn orders_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> WebResult<Json<Vec<Order>>> {
    let orders = state
        .service
        .get_orders_by_product_id(ProductId::new(product_id))
        .await?;
    Ok(Json(orders))
}
