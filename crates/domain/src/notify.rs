//! Customer notification capability and implementations.
//!
//! Delivery is always best-effort: callers log and count failures but never
//! propagate them.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{FulfillmentStatus, Money, OrderId};
use serde::Serialize;
use store::{CustomerDirectory, Order, OrderItem, ShippingAddress};
use thiserror::Error;

/// Order confirmation sent once an order is placed or its payment completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub shipping_address: ShippingAddress,
}

/// Fulfillment status change sent to the order's owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub customer_name: String,
    pub email: String,
    pub new_status: FulfillmentStatus,
}

#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Sends customer notifications.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn order_confirmation(&self, message: &OrderConfirmation) -> Result<(), NotifyError>;

    async fn status_update(&self, message: &StatusUpdate) -> Result<(), NotifyError>;
}

/// Sends an order confirmation to the order's owner, logging any failure.
pub async fn send_order_confirmation<D, N>(directory: &D, notifier: &N, order: &Order)
where
    D: CustomerDirectory + ?Sized,
    N: Notifier + ?Sized,
{
    let customer = match directory.get_customer(order.user_id).await {
        Ok(Some(customer)) => customer,
        Ok(None) => {
            tracing::warn!(
                order_id = %order.id,
                user_id = %order.user_id,
                "No customer on file, confirmation skipped"
            );
            return;
        }
        Err(e) => {
            tracing::warn!(
                order_id = %order.id,
                error = %e,
                "Customer lookup failed, confirmation skipped"
            );
            metrics::counter!("notifications_failed_total", "kind" => "order_confirmation")
                .increment(1);
            return;
        }
    };

    let message = OrderConfirmation {
        order_id: order.id,
        customer_name: customer.name,
        customer_email: customer.email,
        items: order.items.clone(),
        total: order.total,
        shipping_address: order.shipping_address.clone(),
    };

    if let Err(e) = notifier.order_confirmation(&message).await {
        tracing::warn!(order_id = %order.id, error = %e, "Order confirmation failed");
        metrics::counter!("notifications_failed_total", "kind" => "order_confirmation")
            .increment(1);
    }
}

/// Sends a fulfillment status update to the order's owner, logging any failure.
pub async fn send_status_update<D, N>(directory: &D, notifier: &N, order: &Order)
where
    D: CustomerDirectory + ?Sized,
    N: Notifier + ?Sized,
{
    let customer = match directory.get_customer(order.user_id).await {
        Ok(Some(customer)) => customer,
        Ok(None) => {
            tracing::warn!(
                order_id = %order.id,
                user_id = %order.user_id,
                "No customer on file, status update skipped"
            );
            return;
        }
        Err(e) => {
            tracing::warn!(
                order_id = %order.id,
                error = %e,
                "Customer lookup failed, status update skipped"
            );
            metrics::counter!("notifications_failed_total", "kind" => "status_update").increment(1);
            return;
        }
    };

    let message = StatusUpdate {
        order_id: order.id,
        customer_name: customer.name,
        email: customer.email,
        new_status: order.status,
    };

    if let Err(e) = notifier.status_update(&message).await {
        tracing::warn!(order_id = %order.id, error = %e, "Status update notification failed");
        metrics::counter!("notifications_failed_total", "kind" => "status_update").increment(1);
    }
}

/// Notifier that only writes a log line per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn order_confirmation(&self, message: &OrderConfirmation) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %message.order_id,
            email = %message.customer_email,
            total = %message.total,
            items = message.items.len(),
            "Order confirmation sent"
        );
        Ok(())
    }

    async fn status_update(&self, message: &StatusUpdate) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %message.order_id,
            email = %message.email,
            status = %message.new_status,
            "Order status update sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    confirmations: Vec<OrderConfirmation>,
    status_updates: Vec<StatusUpdate>,
    fail: bool,
}

/// In-memory notifier for testing. Records every delivered message.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent delivery to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail = fail;
    }

    pub fn confirmations(&self) -> Vec<OrderConfirmation> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .confirmations
            .clone()
    }

    pub fn status_updates(&self) -> Vec<StatusUpdate> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status_updates
            .clone()
    }

    /// Number of confirmations delivered for one order.
    pub fn confirmations_for(&self, order_id: OrderId) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .confirmations
            .iter()
            .filter(|c| c.order_id == order_id)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_confirmation(&self, message: &OrderConfirmation) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotifyError("mailer unavailable".to_string()));
        }
        state.confirmations.push(message.clone());
        Ok(())
    }

    async fn status_update(&self, message: &StatusUpdate) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotifyError("mailer unavailable".to_string()));
        }
        state.status_updates.push(message.clone());
        Ok(())
    }
}
