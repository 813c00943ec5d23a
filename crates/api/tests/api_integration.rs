//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{Money, OrderId, ProductId, UserId, VariantId};
use domain::RecordingNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use payments::{
    GatewayConfig, GatewayPaymentStatus, InMemoryGateway, RedirectPages, WebhookVerifier,
};
use serde_json::{Value, json};
use store::{CartLine, Customer, InMemoryStore, InventoryLedger, Product, Variant};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_api_tests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    store: InMemoryStore,
    gateway: InMemoryGateway,
    notifier: RecordingNotifier,
    customer: UserId,
    admin: UserId,
    product: ProductId,
    variant: VariantId,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_webhook_secret(WEBHOOK_SECRET).await
    }

    async fn with_webhook_secret(webhook_secret: &str) -> Self {
        let store = InMemoryStore::new();
        let gateway = InMemoryGateway::new();
        let notifier = RecordingNotifier::new();
        let customer = UserId::new();
        let admin = UserId::new();
        let product = ProductId::new();
        let variant = VariantId::new();

        store
            .insert_customer(Customer {
                id: customer,
                name: "Ravi Menon".to_string(),
                email: "ravi@example.com".to_string(),
                phone: Some("9988776655".to_string()),
            })
            .await;
        store
            .insert_product(Product {
                id: product,
                name: "Block Print Kurta".to_string(),
                base_price: Money::from_cents(4500),
                base_sale_price: None,
            })
            .await;
        store
            .insert_variant(Variant {
                id: variant,
                product_id: product,
                price: Money::from_cents(4500),
                sale_price: Some(Money::from_cents(3900)),
                stock: 3,
                size: Some("L".to_string()),
                color: Some("Indigo".to_string()),
                material: Some("Cotton".to_string()),
            })
            .await;

        let gateway_config = GatewayConfig {
            checkout_url: "https://pay.example.com/checkout".to_string(),
            webhook_secret: webhook_secret.to_string(),
            ..GatewayConfig::default()
        };
        let state = Arc::new(AppState::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            gateway_config,
            RedirectPages::from_frontend("https://shop.example.com"),
        ));

        Self {
            router: api::create_app(state, get_metrics_handle()),
            store,
            gateway,
            notifier,
            customer,
            admin,
            product,
            variant,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn request(
        &self,
        method: &str,
        uri: &str,
        user: UserId,
        role: &str,
        body: Option<Value>,
    ) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", user.to_string())
            .header("x-user-role", role);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn checkout(&self, quantity: u32) -> (StatusCode, Value) {
        let body = json!({
            "shippingAddress": {
                "street": "14 MG Road",
                "city": "Bengaluru",
                "state": "KA",
                "zip": "560001",
                "country": "IN"
            },
            "items": [{
                "productId": self.product,
                "variantId": self.variant,
                "quantity": quantity
            }]
        });
        self.send(self.request("POST", "/checkout", self.customer, "customer", Some(body)))
            .await
    }

    async fn placed_order(&self) -> OrderId {
        let (status, json) = self.checkout(1).await;
        assert_eq!(status, StatusCode::CREATED);
        OrderId::parse(json["id"].as_str().unwrap()).unwrap()
    }

    async fn callback(&self, query: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/payments/callback{query}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (response.status(), location)
    }
}

fn webhook_request(body: &[u8], secret: &str) -> Request<Body> {
    let timestamp = "1718000000";
    let signature = WebhookVerifier::new(secret).sign(timestamp, body);
    Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(TIMESTAMP_HEADER, timestamp)
        .body(Body::from(body.to_vec()))
        .unwrap()
}

fn success_webhook(order_id: OrderId) -> Vec<u8> {
    json!({
        "type": "PAYMENT_SUCCESS_WEBHOOK",
        "data": {
            "order": {"order_id": order_id.to_string()},
            "payment": {"cf_payment_id": "cf_77", "payment_amount": 39.0}
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, json) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(Request::builder().uri("/orders").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Request::builder()
                .uri("/orders")
                .header("x-user-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_checkout_snapshots_price_and_reserves_stock() {
    let app = TestApp::new().await;

    let (status, json) = app.checkout(2).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["paymentStatus"], "UNPAID");
    assert_eq!(json["totalCents"], 7800);
    assert_eq!(json["items"][0]["priceCents"], 3900);
    assert_eq!(json["items"][0]["size"], "L");
    assert_eq!(app.store.stock_of(app.variant).await.unwrap(), Some(1));
    assert_eq!(app.notifier.confirmations().len(), 1);
}

#[tokio::test]
async fn test_checkout_insufficient_stock_conflict() {
    let app = TestApp::new().await;

    let (status, json) = app.checkout(5).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["productId"], app.product.to_string());
    assert_eq!(json["requested"], 5);
    assert_eq!(json["available"], 3);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_checkout_from_cart() {
    let app = TestApp::new().await;
    let address = json!({
        "street": "1 Park St",
        "city": "Kolkata",
        "state": "WB",
        "zip": "700016",
        "country": "IN"
    });

    let (status, _) = app
        .send(app.request(
            "POST",
            "/checkout",
            app.customer,
            "customer",
            Some(json!({ "shippingAddress": address })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.store
        .add_to_cart(
            app.customer,
            CartLine {
                product_id: app.product,
                variant_id: Some(app.variant),
                quantity: 3,
            },
        )
        .await;

    let (status, json) = app
        .send(app.request(
            "POST",
            "/checkout",
            app.customer,
            "customer",
            Some(json!({ "shippingAddress": address })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["items"][0]["quantity"], 3);
    assert_eq!(app.store.stock_of(app.variant).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_order_visibility() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;
    let uri = format!("/orders/{order_id}");

    let (status, json) = app
        .send(app.request("GET", &uri, app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], order_id.to_string());

    let (status, _) = app
        .send(app.request("GET", &uri, UserId::new(), "customer", None))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(app.request("GET", &uri, app.admin, "admin", None))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(app.request("GET", "/orders/nope", app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(app.request(
            "GET",
            &format!("/orders/{}", OrderId::new()),
            app.customer,
            "customer",
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = app
        .send(app.request("GET", "/orders", app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_payment_initiation_and_verification() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;
    let payment_uri = format!("/orders/{order_id}/payment");
    let verify_uri = format!("/orders/{order_id}/payment/verify");

    let (status, _) = app
        .send(app.request("POST", &verify_uri, app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = app
        .send(app.request("POST", &payment_uri, app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = json["paymentSessionId"].as_str().unwrap();
    assert_eq!(
        json["paymentLink"],
        format!("https://pay.example.com/checkout/{session_id}")
    );

    let (status, _) = app
        .send(app.request("POST", &payment_uri, app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.gateway
        .set_payment_outcome(&order_id.to_string(), GatewayPaymentStatus::Success);
    let (status, json) = app
        .send(app.request("POST", &verify_uri, app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["paymentStatus"], "COMPLETED");

    let (status, _) = app
        .send(app.request("POST", &payment_uri, app.customer, "customer", None))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_initiation_gateway_failure_is_bad_gateway() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;
    app.gateway.set_fail_on_create(true);

    let (status, _) = app
        .send(app.request(
            "POST",
            &format!("/orders/{order_id}/payment"),
            app.customer,
            "customer",
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_callback_redirects() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;

    let (status, location) = app.callback(&format!("?order_id={order_id}")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location,
        format!("https://shop.example.com/payment/pending?order_id={order_id}")
    );
    assert_eq!(app.gateway.status_calls(), 0);

    let (status, location) = app.callback("").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "https://shop.example.com/payment/failure");

    app.send(app.request(
        "POST",
        &format!("/orders/{order_id}/payment"),
        app.customer,
        "customer",
        None,
    ))
    .await;
    app.gateway
        .set_payment_outcome(&order_id.to_string(), GatewayPaymentStatus::Success);

    let (_, location) = app.callback(&format!("?order_id={order_id}")).await;
    assert_eq!(
        location,
        format!("https://shop.example.com/payment/success?order_id={order_id}")
    );
}

#[tokio::test]
async fn test_callback_with_unreadable_query_redirects_to_failure() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;

    for query in [
        format!("?order_id={order_id}&order_id={order_id}"),
        "?order_id=%FF%FE".to_string(),
        "?order_id=not-a-uuid".to_string(),
    ] {
        let (status, location) = app.callback(&query).await;
        assert_eq!(status, StatusCode::SEE_OTHER, "query {query}");
        assert_eq!(location, "https://shop.example.com/payment/failure");
    }
    assert_eq!(app.gateway.status_calls(), 0);
}

#[tokio::test]
async fn test_webhook_rejected_when_secret_not_configured() {
    let app = TestApp::with_webhook_secret("").await;
    let order_id = app.placed_order().await;
    let body = success_webhook(order_id);

    let (status, _) = app.send(webhook_request(&body, "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, order) = app
        .send(app.request(
            "GET",
            &format!("/orders/{order_id}"),
            app.customer,
            "customer",
            None,
        ))
        .await;
    assert_eq!(order["paymentStatus"], "UNPAID");
    assert_eq!(order["status"], "PENDING");
    assert_eq!(app.notifier.confirmations_for(order_id), 1);
}

#[tokio::test]
async fn test_webhook_signature_and_idempotence() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;
    let body = success_webhook(order_id);

    let (status, _) = app.send(webhook_request(&body, "wrong_secret")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = app.send(webhook_request(&body, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processed");

    let (status, json) = app.send(webhook_request(&body, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");

    let (_, order) = app
        .send(app.request(
            "GET",
            &format!("/orders/{order_id}"),
            app.customer,
            "customer",
            None,
        ))
        .await;
    assert_eq!(order["paymentStatus"], "COMPLETED");
    assert_eq!(order["status"], "PROCESSING");
    // One confirmation at checkout, one for the payment.
    assert_eq!(app.notifier.confirmations_for(order_id), 2);
}

#[tokio::test]
async fn test_admin_status_update() {
    let app = TestApp::new().await;
    let order_id = app.placed_order().await;
    let uri = format!("/admin/orders/{order_id}/status");
    let body = json!({"status": "SHIPPED", "trackingNumber": "AWB123456"});

    let (status, _) = app
        .send(app.request("PATCH", &uri, app.customer, "customer", Some(body.clone())))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(app.request(
            "PATCH",
            &uri,
            app.admin,
            "admin",
            Some(json!({"status": "LOST"})),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .send(app.request("PATCH", &uri, app.admin, "admin", Some(body)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "SHIPPED");
    assert_eq!(json["trackingNumber"], "AWB123456");
    assert_eq!(app.notifier.status_updates().len(), 1);
}
