//! Order services for the storefront.
//!
//! This crate provides:
//! - [`CheckoutService`], which turns line items (or a cart) into a priced,
//!   stock-reserved order in one unit of work
//! - [`FulfillmentService`], the admin-driven fulfillment status controller
//! - the [`Notifier`] capability used for best-effort customer notifications
//! - unit price resolution rules in [`pricing`]

pub mod access;
pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod notify;
pub mod pricing;

pub use access::Role;
pub use checkout::{CheckoutService, LineItemRequest};
pub use error::OrderError;
pub use fulfillment::FulfillmentService;
pub use notify::{
    LoggingNotifier, Notifier, NotifyError, OrderConfirmation, RecordingNotifier, StatusUpdate,
    send_order_confirmation, send_status_update,
};
