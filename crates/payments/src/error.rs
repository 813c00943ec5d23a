//! Payment error types.

use common::{OrderId, UserId};
use store::StoreError;
use thiserror::Error;

/// Errors raised by a payment gateway client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure or timeout.
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood, e.g. a missing session id.
    #[error("Malformed gateway response: {0}")]
    Malformed(String),

    /// The status query returned no payment attempts.
    #[error("No payment data for gateway order {0}")]
    NoPaymentData(String),
}

/// Why a webhook signature was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing webhook header: {0}")]
    MissingHeader(&'static str),

    #[error("Webhook timestamp is not an integer")]
    InvalidTimestamp,

    #[error("Webhook signature mismatch")]
    Mismatch,

    /// No webhook secret is configured, so no signature can be trusted.
    #[error("Webhook secret is not configured")]
    SecretNotConfigured,
}

/// Errors raised by payment session and reconciliation operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Access denied to order {0}")]
    AccessDenied(OrderId),

    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    #[error("Payment already initiated for order {0}")]
    PaymentAlreadyInitiated(OrderId),

    #[error("Payment not initiated for order {0}")]
    PaymentNotInitiated(OrderId),

    /// The gateway requires a contact phone for the customer.
    #[error("Customer {0} has no contact phone on file")]
    MissingContactInfo(UserId),

    #[error("Payment initiation failed: {0}")]
    PaymentInitiationFailed(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(#[from] SignatureError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
