//! Order error types.

use common::{OrderId, ProductId, VariantId};
use store::StoreError;
use thiserror::Error;

/// Errors raised by checkout and fulfillment operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout was attempted with no line items (and an empty cart).
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// A line item requested zero units.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The variant does not exist or belongs to another product.
    #[error("Variant {variant_id} not found for product {product_id}")]
    VariantNotFound {
        product_id: ProductId,
        variant_id: VariantId,
    },

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        variant_id: Option<VariantId>,
        requested: u32,
        available: u32,
    },

    /// A line total or the order total does not fit the money type.
    #[error("Order amount exceeds the supported range")]
    AmountOverflow,

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The caller does not own the order.
    #[error("Access denied to order {0}")]
    AccessDenied(OrderId),

    /// The caller lacks the administrator role.
    #[error("Administrator role required")]
    Forbidden,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Short machine-readable reason, used as a metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "empty_order",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::VariantNotFound { .. } => "variant_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::AmountOverflow => "amount_overflow",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::AccessDenied(_) => "access_denied",
            OrderError::Forbidden => "forbidden",
            OrderError::Store(_) => "store",
        }
    }
}
