//! HTTP API server for the storefront order and payment core.
//!
//! Provides REST endpoints for checkout, order queries, payment sessions,
//! gateway callbacks and webhooks, and administrator fulfillment updates,
//! with structured logging (tracing) and Prometheus metrics.

pub mod actor;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::Notifier;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::PaymentGateway;
use store::StorefrontStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G, N>(
    state: Arc<AppState<S, G, N>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::orders::checkout::<S, G, N>))
        .route("/orders", get(routes::orders::list::<S, G, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, G, N>))
        .route(
            "/orders/{id}/payment",
            post(routes::payments::initiate::<S, G, N>),
        )
        .route(
            "/orders/{id}/payment/verify",
            post(routes::payments::verify::<S, G, N>),
        )
        .route(
            "/payments/callback",
            get(routes::payments::callback::<S, G, N>),
        )
        .route(
            "/payments/webhook",
            post(routes::payments::webhook::<S, G, N>),
        )
        .route(
            "/admin/orders/{id}/status",
            patch(routes::admin::update_status::<S, G, N>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
