//! Payment gateway capability.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub use http::HttpPaymentGateway;
pub use memory::InMemoryGateway;

/// Everything the gateway needs to open a session for one order.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSessionRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub customer_id: UserId,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub return_url: String,
    pub notify_url: String,
}

/// A session opened by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySession {
    pub payment_session_id: String,
    pub gateway_order_id: String,
    pub order_status: String,
    /// The full response body, kept for audit.
    pub raw: serde_json::Value,
}

/// Status of the latest payment attempt as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayPaymentStatus {
    Success,
    Failed,
    Cancelled,
    UserDropped,
    Pending,
    NotAttempted,
    #[serde(other)]
    Unknown,
}

impl GatewayPaymentStatus {
    /// Failure, cancellation or abandonment.
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            GatewayPaymentStatus::Failed
                | GatewayPaymentStatus::Cancelled
                | GatewayPaymentStatus::UserDropped
        )
    }
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStatusReport {
    pub gateway_order_id: String,
    pub order_status: String,
    pub payment_status: GatewayPaymentStatus,
    pub order_amount: Option<f64>,
    pub payment_id: Option<String>,
    pub payment_time: Option<String>,
    pub payment_message: Option<String>,
    pub raw: serde_json::Value,
}

/// A remote payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Short provider name, stored as the order's payment method.
    fn provider(&self) -> &'static str;

    /// Opens a payment session. Never retried by callers.
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, GatewayError>;

    /// Queries the latest payment attempt for a gateway order.
    ///
    /// Fails with [`GatewayError::NoPaymentData`] when no attempt exists.
    async fn fetch_status(&self, gateway_order_id: &str)
    -> Result<PaymentStatusReport, GatewayError>;
}
