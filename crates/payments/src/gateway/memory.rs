//! In-memory payment gateway for testing and local runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::json;

use super::{
    CreateSessionRequest, GatewayPaymentStatus, GatewaySession, PaymentGateway,
    PaymentStatusReport,
};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    /// Amount in major units per gateway order.
    sessions: HashMap<String, f64>,
    outcomes: HashMap<String, GatewayPaymentStatus>,
    next_id: u32,
    create_calls: usize,
    status_calls: usize,
    fail_on_create: bool,
    fail_on_status: bool,
}

/// In-memory gateway. The gateway order id is the order id itself.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut InMemoryGatewayState) -> T) -> T {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Configures session creation to be rejected.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.with_state(|s| s.fail_on_create = fail);
    }

    /// Configures status queries to fail with a server error.
    pub fn set_fail_on_status(&self, fail: bool) {
        self.with_state(|s| s.fail_on_status = fail);
    }

    /// Records the outcome of the customer's payment attempt.
    pub fn set_payment_outcome(&self, gateway_order_id: &str, status: GatewayPaymentStatus) {
        self.with_state(|s| {
            s.outcomes.insert(gateway_order_id.to_string(), status);
        });
    }

    pub fn create_calls(&self) -> usize {
        self.with_state(|s| s.create_calls)
    }

    pub fn status_calls(&self) -> usize {
        self.with_state(|s| s.status_calls)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn provider(&self) -> &'static str {
        "in-memory"
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        self.with_state(|s| {
            s.create_calls += 1;
            if s.fail_on_create {
                return Err(GatewayError::Rejected {
                    status: 400,
                    message: "customer_phone is invalid".to_string(),
                });
            }

            s.next_id += 1;
            let gateway_order_id = request.order_id.to_string();
            let payment_session_id = format!("session_{:04}", s.next_id);
            s.sessions
                .insert(gateway_order_id.clone(), request.amount.as_major_units());

            Ok(GatewaySession {
                raw: json!({
                    "cf_order_id": s.next_id,
                    "order_id": gateway_order_id,
                    "order_status": "ACTIVE",
                    "payment_session_id": payment_session_id,
                }),
                payment_session_id,
                gateway_order_id,
                order_status: "ACTIVE".to_string(),
            })
        })
    }

    async fn fetch_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<PaymentStatusReport, GatewayError> {
        self.with_state(|s| {
            s.status_calls += 1;
            if s.fail_on_status {
                return Err(GatewayError::Rejected {
                    status: 503,
                    message: "service unavailable".to_string(),
                });
            }

            let amount = s.sessions.get(gateway_order_id).copied();
            let Some(status) = s.outcomes.get(gateway_order_id).copied() else {
                return Err(GatewayError::NoPaymentData(gateway_order_id.to_string()));
            };
            let paid = status == GatewayPaymentStatus::Success;

            Ok(PaymentStatusReport {
                gateway_order_id: gateway_order_id.to_string(),
                order_status: if paid { "PAID" } else { "ACTIVE" }.to_string(),
                payment_status: status,
                order_amount: amount,
                payment_id: Some(format!("pay_{gateway_order_id}")),
                payment_time: None,
                payment_message: None,
                raw: json!({
                    "order_id": gateway_order_id,
                    "payment_status": status,
                    "payment_amount": amount,
                }),
            })
        })
    }
}
