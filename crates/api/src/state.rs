//! Shared application state.

use domain::{CheckoutService, FulfillmentService, Notifier};
use payments::{
    GatewayConfig, PaymentGateway, PaymentReconciler, PaymentSessionManager, RedirectPages,
    WebhookVerifier,
};
use store::StorefrontStore;

/// Services shared by all handlers.
pub struct AppState<S, G, N>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    pub checkout: CheckoutService<S, N>,
    pub fulfillment: FulfillmentService<S, N>,
    pub sessions: PaymentSessionManager<S, G>,
    pub reconciler: PaymentReconciler<S, G, N>,
    pub redirects: RedirectPages,
}

impl<S, G, N> AppState<S, G, N>
where
    S: StorefrontStore,
    G: PaymentGateway + Clone,
    N: Notifier + Clone,
{
    /// Wires every service over one store, gateway and notifier.
    pub fn new(
        store: S,
        gateway: G,
        notifier: N,
        gateway_config: GatewayConfig,
        redirects: RedirectPages,
    ) -> Self {
        let verifier = WebhookVerifier::new(&gateway_config.webhook_secret);
        if !verifier.is_configured() {
            tracing::warn!("GATEWAY_WEBHOOK_SECRET is empty; all webhooks will be rejected");
        }

        Self {
            checkout: CheckoutService::new(store.clone(), notifier.clone()),
            fulfillment: FulfillmentService::new(store.clone(), notifier.clone()),
            sessions: PaymentSessionManager::new(store.clone(), gateway.clone(), gateway_config),
            reconciler: PaymentReconciler::new(store, gateway, notifier, verifier),
            redirects,
        }
    }
}
