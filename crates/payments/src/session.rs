//! Payment session creation.

use common::{OrderId, PaymentStatus, UserId};
use serde::Serialize;
use store::{PaymentSessionRecord, StorefrontStore};

use crate::config::GatewayConfig;
use crate::error::PaymentError;
use crate::gateway::{CreateSessionRequest, PaymentGateway};

/// A freshly opened payment session and where to send the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandle {
    pub order_id: OrderId,
    pub gateway_order_id: String,
    pub payment_session_id: String,
    pub order_status: String,
    pub payment_link: String,
}

/// Opens at most one gateway session per order.
pub struct PaymentSessionManager<S, G>
where
    S: StorefrontStore,
    G: PaymentGateway,
{
    store: S,
    gateway: G,
    config: GatewayConfig,
}

impl<S, G> PaymentSessionManager<S, G>
where
    S: StorefrontStore,
    G: PaymentGateway,
{
    pub fn new(store: S, gateway: G, config: GatewayConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Creates a gateway session for the caller's order.
    ///
    /// Preconditions are checked in order: the order exists, belongs to the
    /// caller, is not paid, has no session yet, and the caller has a contact
    /// phone. The session is attached with a compare-and-set, so when two
    /// calls race past the checks only one persists its session.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<PaymentHandle, PaymentError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if order.user_id != user_id {
            return Err(PaymentError::AccessDenied(order_id));
        }
        if order.payment_status == PaymentStatus::Completed {
            return Err(PaymentError::AlreadyPaid(order_id));
        }
        if order.has_payment_session() {
            return Err(PaymentError::PaymentAlreadyInitiated(order_id));
        }

        let customer = self
            .store
            .get_customer(user_id)
            .await?
            .ok_or(PaymentError::MissingContactInfo(user_id))?;
        let phone = customer
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(PaymentError::MissingContactInfo(user_id))?
            .to_string();

        let request = CreateSessionRequest {
            order_id,
            amount: order.total,
            customer_id: user_id,
            customer_name: customer.name,
            customer_email: customer.email,
            customer_phone: phone,
            return_url: self.config.return_url(order_id),
            notify_url: self.config.notify_url(),
        };

        let session = self.gateway.create_session(&request).await.map_err(|e| {
            tracing::warn!(error = %e, "Gateway rejected session creation");
            PaymentError::PaymentInitiationFailed(e.to_string())
        })?;

        let record = PaymentSessionRecord {
            gateway_order_id: session.gateway_order_id.clone(),
            payment_session_id: session.payment_session_id.clone(),
            payment_method: self.gateway.provider().to_string(),
            response: session.raw.clone(),
        };

        if !self.store.attach_payment_session(order_id, &record).await? {
            tracing::warn!(
                gateway_order_id = %session.gateway_order_id,
                payment_session_id = %session.payment_session_id,
                "Orphaned gateway session: another request attached first"
            );
            return Err(PaymentError::PaymentAlreadyInitiated(order_id));
        }

        metrics::counter!("payment_sessions_created_total").increment(1);
        tracing::info!(
            gateway_order_id = %session.gateway_order_id,
            "Payment session created"
        );

        Ok(PaymentHandle {
            order_id,
            payment_link: self.config.payment_link(&session.payment_session_id),
            gateway_order_id: session.gateway_order_id,
            payment_session_id: session.payment_session_id,
            order_status: session.order_status,
        })
    }
}
