//! Webhook payloads pushed by the gateway.

use common::OrderId;
use serde::Deserialize;
use serde_json::Value;

use crate::gateway::http::id_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "PAYMENT_SUCCESS_WEBHOOK")]
    PaymentSuccess,
    #[serde(rename = "PAYMENT_FAILED_WEBHOOK")]
    PaymentFailed,
    #[serde(rename = "PAYMENT_USER_DROPPED_WEBHOOK")]
    PaymentUserDropped,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookOrder {
    pub order_id: String,
    #[serde(default)]
    pub cf_order_id: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayment {
    #[serde(default)]
    pub payment_amount: Option<f64>,
    #[serde(default)]
    pub payment_time: Option<String>,
    #[serde(default)]
    pub cf_payment_id: Option<Value>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub order: WebhookOrder,
    #[serde(default)]
    pub payment: WebhookPayment,
}

/// A verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    pub data: WebhookData,
    #[serde(default)]
    pub event_time: Option<String>,
}

impl WebhookEvent {
    /// The storefront order the event refers to.
    pub fn order_id(&self) -> Option<OrderId> {
        OrderId::parse(self.data.order.order_id.trim()).ok()
    }

    pub fn payment_id(&self) -> Option<String> {
        id_string(self.data.payment.cf_payment_id.as_ref())
    }
}
