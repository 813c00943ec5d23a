//! HTTP client for a hosted-checkout payment gateway.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    CreateSessionRequest, GatewayPaymentStatus, GatewaySession, PaymentGateway,
    PaymentStatusReport,
};
use crate::config::GatewayConfig;
use crate::error::GatewayError;

const CURRENCY: &str = "INR";

/// Gateway client speaking JSON over HTTPS.
///
/// Every request carries the client credentials and API version headers and
/// is bounded by the configured timeout. Status queries are retried once on
/// transport errors and 5xx responses; session creation never is.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    api_version: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-client-id", &self.client_id)
            .header("x-client-secret", &self.client_secret)
            .header("x-api-version", &self.api_version)
            .header("accept", "application/json")
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    async fn get_payments(&self, gateway_order_id: &str) -> Result<Value, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/orders/{gateway_order_id}/payments"),
            )
            .send()
            .await?;
        Self::read_json(response).await
    }
}

fn is_retriable(error: &GatewayError) -> bool {
    match error {
        GatewayError::Http(_) => true,
        GatewayError::Rejected { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Renders an id the gateway may send as either a number or a string.
pub(crate) fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_session(
    body: Value,
    request: &CreateSessionRequest,
) -> Result<GatewaySession, GatewayError> {
    let payment_session_id = body
        .get("payment_session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::Malformed("missing payment_session_id".to_string()))?
        .to_string();
    let gateway_order_id =
        id_string(body.get("order_id")).unwrap_or_else(|| request.order_id.to_string());
    let order_status = body
        .get("order_status")
        .and_then(Value::as_str)
        .unwrap_or("ACTIVE")
        .to_string();

    Ok(GatewaySession {
        payment_session_id,
        gateway_order_id,
        order_status,
        raw: body,
    })
}

/// Picks the attempt that decides the order: a successful one if any, else
/// the first listed.
fn parse_payments(
    body: Value,
    gateway_order_id: &str,
) -> Result<PaymentStatusReport, GatewayError> {
    let attempts = body
        .as_array()
        .ok_or_else(|| GatewayError::Malformed("expected a list of payments".to_string()))?;

    let status_of = |p: &Value| {
        p.get("payment_status")
            .cloned()
            .and_then(|s| serde_json::from_value::<GatewayPaymentStatus>(s).ok())
            .unwrap_or(GatewayPaymentStatus::Unknown)
    };

    let attempt = attempts
        .iter()
        .find(|&p| status_of(p) == GatewayPaymentStatus::Success)
        .or_else(|| attempts.first())
        .ok_or_else(|| GatewayError::NoPaymentData(gateway_order_id.to_string()))?;

    let payment_status = status_of(attempt);
    let order_status = attempt
        .get("order_status")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if payment_status == GatewayPaymentStatus::Success {
                "PAID".to_string()
            } else {
                "ACTIVE".to_string()
            }
        });

    Ok(PaymentStatusReport {
        gateway_order_id: id_string(attempt.get("order_id"))
            .unwrap_or_else(|| gateway_order_id.to_string()),
        order_status,
        payment_status,
        order_amount: attempt
            .get("order_amount")
            .or_else(|| attempt.get("payment_amount"))
            .and_then(Value::as_f64),
        payment_id: id_string(attempt.get("cf_payment_id")),
        payment_time: attempt
            .get("payment_time")
            .and_then(Value::as_str)
            .map(str::to_string),
        payment_message: attempt
            .get("payment_message")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw: attempt.clone(),
    })
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn provider(&self) -> &'static str {
        "cashfree"
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        let body = json!({
            "order_id": request.order_id.to_string(),
            "order_amount": request.amount.as_major_units(),
            "order_currency": CURRENCY,
            "customer_details": {
                "customer_id": request.customer_id.to_string(),
                "customer_name": request.customer_name,
                "customer_email": request.customer_email,
                "customer_phone": request.customer_phone,
            },
            "order_meta": {
                "return_url": request.return_url,
                "notify_url": request.notify_url,
            },
        });

        let response = self
            .request(reqwest::Method::POST, "/orders")
            .json(&body)
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        parse_session(body, request)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<PaymentStatusReport, GatewayError> {
        let body = match self.get_payments(gateway_order_id).await {
            Err(e) if is_retriable(&e) => {
                tracing::warn!(error = %e, "Status query failed, retrying once");
                self.get_payments(gateway_order_id).await?
            }
            other => other?,
        };
        parse_payments(body, gateway_order_id)
    }
}
