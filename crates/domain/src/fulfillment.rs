//! Administrator-driven fulfillment status changes.

use common::{FulfillmentStatus, OrderId};
use store::{Order, StorefrontStore};

use crate::access::Role;
use crate::error::OrderError;
use crate::notify::{Notifier, send_status_update};

/// Moves orders along their fulfillment lifecycle.
///
/// Any status may follow any other. Payment status is never touched here.
pub struct FulfillmentService<S, N>
where
    S: StorefrontStore,
    N: Notifier,
{
    store: S,
    notifier: N,
}

impl<S, N> FulfillmentService<S, N>
where
    S: StorefrontStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Sets an order's fulfillment status, and its tracking number when given.
    ///
    /// Requires the admin role. The owner is notified on success; a failed
    /// notification is logged and does not fail the update.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        actor_role: Role,
        order_id: OrderId,
        new_status: FulfillmentStatus,
        tracking_number: Option<String>,
    ) -> Result<Order, OrderError> {
        if !actor_role.is_admin() {
            return Err(OrderError::Forbidden);
        }

        let current = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if current.status.is_regression_to(new_status) {
            tracing::warn!(
                %order_id,
                from = %current.status,
                to = %new_status,
                "Fulfillment status moved backwards"
            );
        }

        let order = self
            .store
            .update_fulfillment(order_id, new_status, tracking_number)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        tracing::info!(%order_id, status = %order.status, "Fulfillment status updated");
        send_status_update(&self.store, &self.notifier, &order).await;

        Ok(order)
    }
}
