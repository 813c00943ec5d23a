//! HTTP route handlers.

pub mod admin;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use common::OrderId;

use crate::error::ApiError;

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}
