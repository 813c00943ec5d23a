//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::Config;
use domain::LoggingNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{HttpPaymentGateway, InMemoryGateway, PaymentGateway};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, StorefrontStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S, G>(config: &Config, store: S, gateway: G, metrics_handle: PrometheusHandle)
where
    S: StorefrontStore,
    G: PaymentGateway + Clone,
{
    let state = Arc::new(AppState::new(
        store,
        gateway,
        LoggingNotifier,
        config.gateway.clone(),
        config.redirects.clone(),
    ));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn serve_with_gateway<S: StorefrontStore>(
    config: &Config,
    store: S,
    metrics_handle: PrometheusHandle,
) {
    match config.gateway.base_url.as_deref() {
        Some(base_url) => {
            let gateway = HttpPaymentGateway::new(base_url, &config.gateway)
                .expect("failed to build gateway client");
            tracing::info!(%base_url, "using HTTP payment gateway");
            serve(config, store, gateway, metrics_handle).await;
        }
        None => {
            tracing::warn!("GATEWAY_BASE_URL not set, using in-memory payment gateway");
            serve(config, store, InMemoryGateway::new(), metrics_handle).await;
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration (.env first)
    let config = Config::from_env();

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Pick the store and start serving
    match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve_with_gateway(&config, store, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve_with_gateway(&config, InMemoryStore::new(), metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
