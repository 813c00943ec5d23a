//! Gateway and redirect configuration.

use std::time::Duration;

use common::OrderId;

/// Settings for talking to the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway API; `None` selects the in-memory gateway.
    pub base_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,
    pub timeout: Duration,
    /// Hosted checkout page; the payment link is this URL plus the session id.
    pub checkout_url: String,
    pub webhook_secret: String,
    /// Public URL of this service, used for the return and notify URLs.
    pub backend_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            client_id: String::new(),
            client_secret: String::new(),
            api_version: "2023-08-01".to_string(),
            timeout: Duration::from_secs(10),
            checkout_url: "https://payments.example.com/checkout".to_string(),
            webhook_secret: String::new(),
            backend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Where the gateway sends the customer's browser after payment.
    pub fn return_url(&self, order_id: OrderId) -> String {
        format!(
            "{}/payments/callback?order_id={}",
            self.backend_url.trim_end_matches('/'),
            order_id
        )
    }

    /// Where the gateway posts webhook events.
    pub fn notify_url(&self) -> String {
        format!("{}/payments/webhook", self.backend_url.trim_end_matches('/'))
    }

    pub fn payment_link(&self, payment_session_id: &str) -> String {
        format!(
            "{}/{}",
            self.checkout_url.trim_end_matches('/'),
            payment_session_id
        )
    }
}

/// Frontend pages the callback channel redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPages {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

impl RedirectPages {
    /// Derives the three pages from the frontend base URL.
    pub fn from_frontend(frontend_url: &str) -> Self {
        let base = frontend_url.trim_end_matches('/');
        Self {
            success: format!("{base}/payment/success"),
            pending: format!("{base}/payment/pending"),
            failure: format!("{base}/payment/failure"),
        }
    }
}

impl Default for RedirectPages {
    fn default() -> Self {
        Self::from_frontend("http://localhost:5173")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_urls_without_double_slashes() {
        let config = GatewayConfig {
            checkout_url: "https://pay.example.com/checkout/".to_string(),
            backend_url: "https://api.example.com/".to_string(),
            ..GatewayConfig::default()
        };
        let order_id = OrderId::new();

        assert_eq!(
            config.payment_link("session_1"),
            "https://pay.example.com/checkout/session_1"
        );
        assert_eq!(
            config.return_url(order_id),
            format!("https://api.example.com/payments/callback?order_id={order_id}")
        );
        assert_eq!(config.notify_url(), "https://api.example.com/payments/webhook");

        let pages = RedirectPages::from_frontend("https://shop.example.com/");
        assert_eq!(pages.pending, "https://shop.example.com/payment/pending");
    }
}
