//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use payments::PaymentError;
use serde_json::json;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Caller identity is missing or malformed.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout or fulfillment error.
    Order(OrderError),
    /// Payment session or reconciliation error.
    Payment(PaymentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, serde_json::Value) {
    tracing::error!(error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "internal server error" }),
    )
}

fn order_error_to_response(err: OrderError) -> (StatusCode, serde_json::Value) {
    let status = match &err {
        OrderError::InsufficientStock {
            product_id,
            variant_id,
            requested,
            available,
        } => {
            return (
                StatusCode::CONFLICT,
                json!({
                    "error": err.to_string(),
                    "productId": product_id,
                    "variantId": variant_id,
                    "requested": requested,
                    "available": available,
                }),
            );
        }
        OrderError::EmptyOrder
        | OrderError::InvalidQuantity { .. }
        | OrderError::ProductNotFound(_)
        | OrderError::VariantNotFound { .. }
        | OrderError::AmountOverflow => StatusCode::BAD_REQUEST,
        OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::AccessDenied(_) | OrderError::Forbidden => StatusCode::FORBIDDEN,
        OrderError::Store(_) => return internal(&err),
    };
    (status, json!({ "error": err.to_string() }))
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, serde_json::Value) {
    let status = match &err {
        PaymentError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::AccessDenied(_) => StatusCode::FORBIDDEN,
        PaymentError::AlreadyPaid(_)
        | PaymentError::PaymentAlreadyInitiated(_)
        | PaymentError::PaymentNotInitiated(_) => StatusCode::CONFLICT,
        PaymentError::MissingContactInfo(_) => StatusCode::BAD_REQUEST,
        PaymentError::PaymentInitiationFailed(_) | PaymentError::Gateway(_) => {
            StatusCode::BAD_GATEWAY
        }
        PaymentError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
        PaymentError::Store(_) => return internal(&err),
    };
    (status, json!({ "error": err.to_string() }))
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
