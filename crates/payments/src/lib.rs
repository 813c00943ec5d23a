//! Payment processing for storefront orders.
//!
//! This crate provides:
//! - the [`PaymentGateway`] capability with an HTTP client and an in-memory fake
//! - webhook signature verification ([`WebhookVerifier`])
//! - the [`PaymentSessionManager`], which opens at most one gateway session per order
//! - the [`PaymentReconciler`], where the verify, callback and webhook channels
//!   converge on one compare-and-set payment transition

pub mod config;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod session;
pub mod signature;
pub mod webhook;

pub use config::{GatewayConfig, RedirectPages};
pub use error::{GatewayError, PaymentError, SignatureError};
pub use gateway::{
    CreateSessionRequest, GatewayPaymentStatus, GatewaySession, HttpPaymentGateway,
    InMemoryGateway, PaymentGateway, PaymentStatusReport,
};
pub use reconciler::{CallbackOutcome, Channel, PaymentReconciler, WebhookAck};
pub use session::{PaymentHandle, PaymentSessionManager};
pub use signature::WebhookVerifier;
pub use webhook::{WebhookEvent, WebhookEventType};
