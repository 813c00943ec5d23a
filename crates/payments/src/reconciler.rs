//! Payment status reconciliation.
//!
//! Three channels may observe the outcome of a payment, in any order and any
//! number of times: the customer's verify call, the browser redirect callback
//! and the gateway webhook. All of them funnel into [`PaymentReconciler`]'s
//! two transitions, which are compare-and-set updates in the store:
//!
//! | Current   | Event            | New       |
//! |-----------|------------------|-----------|
//! | UNPAID    | success          | COMPLETED (fulfillment PROCESSING, notify) |
//! | UNPAID    | failure / cancel | FAILED    |
//! | UNPAID    | user dropped     | UNPAID (audit only) |
//! | FAILED    | success          | COMPLETED, flagged `late_success` |
//! | COMPLETED | anything         | COMPLETED |
//!
//! Only the caller whose update applies sends the confirmation, so a payment
//! confirmed through several channels notifies the customer once.

use common::{OrderId, PaymentStatus, UserId};
use domain::{Notifier, send_order_confirmation};
use serde_json::{Map, Value, json};
use store::{PaymentSettlement, StorefrontStore};

use crate::config::RedirectPages;
use crate::error::{GatewayError, PaymentError};
use crate::gateway::{GatewayPaymentStatus, PaymentGateway, PaymentStatusReport};
use crate::signature::WebhookVerifier;
use crate::webhook::{WebhookEvent, WebhookEventType};

/// The path through which a payment outcome was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Verify,
    Callback,
    Webhook,
}

impl Channel {
    /// Metric label, also the audit blob key for this channel's detail.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Verify => "verify",
            Channel::Callback => "callback",
            Channel::Webhook => "webhook",
        }
    }
}

/// Where the callback channel sends the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success(OrderId),
    Pending(OrderId),
    /// Missing or unknown order.
    Failure,
}

impl CallbackOutcome {
    pub fn redirect_url(&self, pages: &RedirectPages) -> String {
        match self {
            CallbackOutcome::Success(id) => format!("{}?order_id={}", pages.success, id),
            CallbackOutcome::Pending(id) => format!("{}?order_id={}", pages.pending, id),
            CallbackOutcome::Failure => pages.failure.clone(),
        }
    }
}

/// Result of a webhook that passed signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// The event changed the order or its audit trail.
    Processed,
    /// Duplicate, unknown or unprocessable; logged and acknowledged.
    Ignored,
}

fn audit_entry(key: &str, value: Value) -> Value {
    let mut entry = Map::new();
    entry.insert(key.to_string(), value);
    Value::Object(entry)
}

fn report_detail(report: &PaymentStatusReport) -> Value {
    json!({
        "order_status": report.order_status,
        "payment_status": report.payment_status,
        "order_amount": report.order_amount,
        "payment_time": report.payment_time,
        "payment_message": report.payment_message,
        "cf_payment_id": report.payment_id,
        "raw": report.raw,
    })
}

/// Converges the payment status of orders from every reporting channel.
pub struct PaymentReconciler<S, G, N>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    store: S,
    gateway: G,
    notifier: N,
    verifier: WebhookVerifier,
}

impl<S, G, N> PaymentReconciler<S, G, N>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    pub fn new(store: S, gateway: G, notifier: N, verifier: WebhookVerifier) -> Self {
        Self {
            store,
            gateway,
            notifier,
            verifier,
        }
    }

    /// Polls the gateway on the customer's behalf and applies the outcome.
    ///
    /// Returns the payment status after reconciliation.
    #[tracing::instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<PaymentStatus, PaymentError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if order.user_id != user_id {
            return Err(PaymentError::AccessDenied(order_id));
        }
        let gateway_order_id = order
            .gateway_order_id
            .as_deref()
            .ok_or(PaymentError::PaymentNotInitiated(order_id))?;

        let report = match self.gateway.fetch_status(gateway_order_id).await {
            Ok(report) => report,
            Err(GatewayError::NoPaymentData(_)) => {
                tracing::debug!("No payment attempt yet");
                return Ok(order.payment_status);
            }
            Err(e) => return Err(e.into()),
        };

        let settlement = PaymentSettlement {
            gateway_payment_id: report.payment_id.clone(),
            detail: audit_entry(Channel::Verify.as_str(), report_detail(&report)),
        };

        if report.payment_status == GatewayPaymentStatus::Success {
            self.apply_success(order_id, Channel::Verify, &settlement)
                .await?;
        } else if report.payment_status.is_terminal_failure()
            && order.payment_status != PaymentStatus::Failed
        {
            self.apply_failure(order_id, Channel::Verify, &settlement)
                .await?;
        }

        let current = self
            .store
            .get_order(order_id)
            .await?
            .map(|o| o.payment_status)
            .unwrap_or(order.payment_status);
        Ok(current)
    }

    /// Handles the browser's return from the gateway. Never fails.
    #[tracing::instrument(skip(self))]
    pub async fn payment_callback(&self, order_id: Option<OrderId>) -> CallbackOutcome {
        let Some(order_id) = order_id else {
            return CallbackOutcome::Failure;
        };

        let order = match self.store.get_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return CallbackOutcome::Failure,
            Err(e) => {
                tracing::error!(error = %e, "Order lookup failed during callback");
                return CallbackOutcome::Pending(order_id);
            }
        };

        if order.payment_status == PaymentStatus::Completed {
            return CallbackOutcome::Success(order_id);
        }
        let Some(gateway_order_id) = order.gateway_order_id.as_deref() else {
            return CallbackOutcome::Pending(order_id);
        };

        let report = match self.gateway.fetch_status(gateway_order_id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Status query failed during callback");
                return CallbackOutcome::Pending(order_id);
            }
        };
        if report.payment_status != GatewayPaymentStatus::Success {
            return CallbackOutcome::Pending(order_id);
        }

        let settlement = PaymentSettlement {
            gateway_payment_id: report.payment_id.clone(),
            detail: audit_entry(Channel::Callback.as_str(), report_detail(&report)),
        };
        match self
            .apply_success(order_id, Channel::Callback, &settlement)
            .await
        {
            Ok(_) => CallbackOutcome::Success(order_id),
            Err(e) => {
                tracing::error!(error = %e, "Failed to record payment during callback");
                CallbackOutcome::Pending(order_id)
            }
        }
    }

    /// Handles a gateway webhook.
    ///
    /// Only an invalid or missing signature is an error. Once the signature
    /// is verified every processing failure is logged and acknowledged so
    /// the gateway does not keep redelivering the event.
    #[tracing::instrument(skip(self, signature, timestamp, body), fields(bytes = body.len()))]
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, PaymentError> {
        if let Err(e) = self.verifier.verify(signature, timestamp, body) {
            metrics::counter!("webhook_signature_rejected_total").increment(1);
            tracing::warn!(error = %e, "Webhook rejected");
            return Err(e.into());
        }

        match self.process_webhook(body).await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                tracing::error!(error = %e, "Webhook processing failed");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    async fn process_webhook(&self, body: &[u8]) -> Result<WebhookAck, PaymentError> {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Webhook body is not JSON");
                return Ok(WebhookAck::Ignored);
            }
        };
        let event: WebhookEvent = match serde_json::from_value(payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Unrecognized webhook payload");
                return Ok(WebhookAck::Ignored);
            }
        };

        let Some(order_id) = event.order_id() else {
            tracing::warn!(
                order_ref = %event.data.order.order_id,
                "Webhook for unknown order reference"
            );
            return Ok(WebhookAck::Ignored);
        };
        let Some(order) = self.store.get_order(order_id).await? else {
            tracing::warn!(%order_id, "Webhook for missing order");
            return Ok(WebhookAck::Ignored);
        };

        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        match event.event_type {
            WebhookEventType::PaymentSuccess => {
                if order.payment_status == PaymentStatus::Completed {
                    tracing::info!(%order_id, "Duplicate success webhook, already completed");
                    return Ok(WebhookAck::Ignored);
                }
                let settlement = PaymentSettlement {
                    gateway_payment_id: event.payment_id(),
                    detail: audit_entry(Channel::Webhook.as_str(), data),
                };
                let applied = self
                    .apply_success(order_id, Channel::Webhook, &settlement)
                    .await?;
                Ok(if applied {
                    WebhookAck::Processed
                } else {
                    WebhookAck::Ignored
                })
            }
            WebhookEventType::PaymentFailed => {
                if order.payment_status != PaymentStatus::Unpaid {
                    tracing::info!(
                        %order_id,
                        status = %order.payment_status,
                        "Failure webhook ignored"
                    );
                    return Ok(WebhookAck::Ignored);
                }
                let settlement = PaymentSettlement {
                    gateway_payment_id: event.payment_id(),
                    detail: audit_entry(Channel::Webhook.as_str(), data),
                };
                let applied = self
                    .apply_failure(order_id, Channel::Webhook, &settlement)
                    .await?;
                Ok(if applied {
                    WebhookAck::Processed
                } else {
                    WebhookAck::Ignored
                })
            }
            WebhookEventType::PaymentUserDropped => {
                let recorded = self
                    .store
                    .record_payment_detail(order_id, &audit_entry("user_dropped", data))
                    .await?;
                tracing::info!(%order_id, recorded, "Customer dropped out of payment");
                Ok(if recorded {
                    WebhookAck::Processed
                } else {
                    WebhookAck::Ignored
                })
            }
            WebhookEventType::Other => {
                tracing::debug!(%order_id, "Ignoring unhandled webhook type");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    /// Applies the COMPLETED transition. Returns true if this call won it.
    async fn apply_success(
        &self,
        order_id: OrderId,
        channel: Channel,
        settlement: &PaymentSettlement,
    ) -> Result<bool, PaymentError> {
        let Some(previous) = self.store.complete_payment(order_id, settlement).await? else {
            tracing::debug!(
                %order_id,
                channel = channel.as_str(),
                "Payment already completed"
            );
            return Ok(false);
        };

        metrics::counter!(
            "payment_transitions_total",
            "channel" => channel.as_str(),
            "to" => PaymentStatus::Completed.as_str()
        )
        .increment(1);

        if previous == PaymentStatus::Failed {
            metrics::counter!("payment_late_success_total").increment(1);
            tracing::warn!(
                %order_id,
                channel = channel.as_str(),
                "Late payment success reopened a failed order"
            );
        } else {
            tracing::info!(%order_id, channel = channel.as_str(), "Payment completed");
        }

        if let Some(order) = self.store.get_order(order_id).await? {
            send_order_confirmation(&self.store, &self.notifier, &order).await;
        }
        Ok(true)
    }

    /// Applies the FAILED transition. Returns true if this call won it.
    async fn apply_failure(
        &self,
        order_id: OrderId,
        channel: Channel,
        settlement: &PaymentSettlement,
    ) -> Result<bool, PaymentError> {
        let applied = self.store.fail_payment(order_id, settlement).await?;
        if applied {
            metrics::counter!(
                "payment_transitions_total",
                "channel" => channel.as_str(),
                "to" => PaymentStatus::Failed.as_str()
            )
            .increment(1);
            tracing::info!(%order_id, channel = channel.as_str(), "Payment failed");
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_redirects_carry_order_id() {
        let pages = RedirectPages::from_frontend("https://shop.example.com");
        let order_id = OrderId::new();

        assert_eq!(
            CallbackOutcome::Success(order_id).redirect_url(&pages),
            format!("https://shop.example.com/payment/success?order_id={order_id}")
        );
        assert_eq!(
            CallbackOutcome::Pending(order_id).redirect_url(&pages),
            format!("https://shop.example.com/payment/pending?order_id={order_id}")
        );
        assert_eq!(
            CallbackOutcome::Failure.redirect_url(&pages),
            "https://shop.example.com/payment/failure"
        );
    }

    #[test]
    fn audit_entry_nests_under_key() {
        assert_eq!(
            audit_entry("verify", json!({"ok": true})),
            json!({"verify": {"ok": true}})
        );
    }
}
