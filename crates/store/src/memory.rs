use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, UserId, VariantId};
use tokio::sync::RwLock;

use crate::model::merge_audit;
use crate::{
    CartLine, CatalogReader, Customer, CustomerDirectory, InventoryLedger, NewOrder, Order,
    OrderStore, PaymentSessionRecord, PaymentSettlement, PlaceOrderOutcome, Product, Result,
    Variant,
};

#[derive(Default)]
struct State {
    customers: HashMap<UserId, Customer>,
    products: HashMap<ProductId, Product>,
    variants: HashMap<VariantId, Variant>,
    carts: HashMap<UserId, Vec<CartLine>>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    /// Conditional decrement; the caller holds the write lock.
    fn reserve(&mut self, variant_id: VariantId, quantity: u32) -> bool {
        match self.variants.get_mut(&variant_id) {
            Some(variant) if variant.stock >= quantity => {
                variant.stock -= quantity;
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, variant_id: VariantId, quantity: u32) {
        if let Some(variant) = self.variants.get_mut(&variant_id) {
            variant.stock += quantity;
        }
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Provides the same interface as the PostgreSQL implementation. Every
/// mutating operation runs under a single write lock, which stands in for
/// the database transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a customer.
    pub async fn insert_customer(&self, customer: Customer) {
        self.state
            .write()
            .await
            .customers
            .insert(customer.id, customer);
    }

    /// Inserts or replaces a product.
    pub async fn insert_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    /// Inserts or replaces a variant.
    pub async fn insert_variant(&self, variant: Variant) {
        self.state.write().await.variants.insert(variant.id, variant);
    }

    /// Changes a variant's prices, leaving placed orders untouched.
    pub async fn set_variant_price(
        &self,
        variant_id: VariantId,
        price: Money,
        sale_price: Option<Money>,
    ) {
        if let Some(variant) = self.state.write().await.variants.get_mut(&variant_id) {
            variant.price = price;
            variant.sale_price = sale_price;
        }
    }

    /// Appends a line to a customer's cart.
    pub async fn add_to_cart(&self, user_id: UserId, line: CartLine) {
        self.state
            .write()
            .await
            .carts
            .entry(user_id)
            .or_default()
            .push(line);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl CatalogReader for InMemoryStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<Variant>> {
        Ok(self.state.read().await.variants.get(&variant_id).cloned())
    }

    async fn variants_for_product(&self, product_id: ProductId) -> Result<Vec<Variant>> {
        let state = self.state.read().await;
        let mut variants: Vec<_> = state
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect();
        variants.sort_by_key(|v| v.id);
        Ok(variants)
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn reserve(&self, variant_id: VariantId, quantity: u32) -> Result<bool> {
        Ok(self.state.write().await.reserve(variant_id, quantity))
    }

    async fn release(&self, variant_id: VariantId, quantity: u32) -> Result<()> {
        self.state.write().await.release(variant_id, quantity);
        Ok(())
    }

    async fn stock_of(&self, variant_id: VariantId) -> Result<Option<u32>> {
        Ok(self
            .state
            .read()
            .await
            .variants
            .get(&variant_id)
            .map(|v| v.stock))
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryStore {
    async fn get_customer(&self, user_id: UserId) -> Result<Option<Customer>> {
        Ok(self.state.read().await.customers.get(&user_id).cloned())
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, order: NewOrder) -> Result<PlaceOrderOutcome> {
        let mut state = self.state.write().await;

        let mut reserved: Vec<(VariantId, u32)> = Vec::new();
        for item in &order.items {
            let Some(variant_id) = item.variant_id else {
                continue;
            };
            if !state.reserve(variant_id, item.quantity) {
                // Roll back reservations made in this attempt
                for (id, quantity) in reserved {
                    state.release(id, quantity);
                }
                return Ok(PlaceOrderOutcome::OutOfStock {
                    variant_id,
                    requested: item.quantity,
                });
            }
            reserved.push((variant_id, item.quantity));
        }

        let user_id = order.user_id;
        let order = order.into_order();
        state.orders.insert(order.id, order.clone());
        state.carts.remove(&user_id);

        Ok(PlaceOrderOutcome::Placed(order))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn attach_payment_session(
        &self,
        order_id: OrderId,
        session: &PaymentSessionRecord,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if order.gateway_order_id.is_some() || order.payment_status.is_terminal() {
            return Ok(false);
        }

        order.gateway_order_id = Some(session.gateway_order_id.clone());
        order.payment_session_id = Some(session.payment_session_id.clone());
        order.payment_method = Some(session.payment_method.clone());
        merge_audit(
            &mut order.gateway_response,
            &serde_json::json!({ "session": session.response }),
        );
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_payment(
        &self,
        order_id: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<Option<PaymentStatus>> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        if !order.payment_status.can_complete() {
            return Ok(None);
        }

        let previous = order.payment_status;
        order.payment_status = PaymentStatus::Completed;
        order.status = FulfillmentStatus::Processing;
        if let Some(payment_id) = &settlement.gateway_payment_id {
            order.gateway_payment_id = Some(payment_id.clone());
        }
        merge_audit(&mut order.gateway_response, &settlement.detail);
        if previous == PaymentStatus::Failed {
            merge_audit(
                &mut order.gateway_response,
                &serde_json::json!({"late_success": true}),
            );
        }
        order.updated_at = Utc::now();
        Ok(Some(previous))
    }

    async fn fail_payment(
        &self,
        order_id: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if !order.payment_status.can_fail() {
            return Ok(false);
        }

        order.payment_status = PaymentStatus::Failed;
        if let Some(payment_id) = &settlement.gateway_payment_id {
            order.gateway_payment_id = Some(payment_id.clone());
        }
        merge_audit(&mut order.gateway_response, &settlement.detail);
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_payment_detail(
        &self,
        order_id: OrderId,
        detail: &serde_json::Value,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order_id) {
            Some(order) if !order.payment_status.is_terminal() => {
                merge_audit(&mut order.gateway_response, detail);
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        tracking_number: Option<String>,
    ) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        order.status = status;
        if tracking_number.is_some() {
            order.tracking_number = tracking_number;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewOrderItem, ShippingAddress};
    use serde_json::json;

    fn variant(product_id: ProductId, stock: u32) -> Variant {
        Variant {
            id: VariantId::new(),
            product_id,
            price: Money::from_cents(1500),
            sale_price: None,
            stock,
            size: Some("M".to_string()),
            color: None,
            material: None,
        }
    }

    fn new_order(user_id: UserId, lines: &[(ProductId, Option<VariantId>, u32)]) -> NewOrder {
        let now = Utc::now();
        NewOrder {
            id: OrderId::new(),
            user_id,
            total: Money::zero(),
            shipping_address: ShippingAddress::default(),
            estimated_delivery: now,
            created_at: now,
            items: lines
                .iter()
                .map(|(product_id, variant_id, quantity)| NewOrderItem {
                    product_id: *product_id,
                    variant_id: *variant_id,
                    product_name: "Canvas Tote".to_string(),
                    quantity: *quantity,
                    price: Money::from_cents(1500),
                    size: None,
                    color: None,
                    material: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn reserve_decrements_only_when_sufficient() {
        let store = InMemoryStore::new();
        let v = variant(ProductId::new(), 3);
        store.insert_variant(v.clone()).await;

        assert!(store.reserve(v.id, 2).await.unwrap());
        assert!(!store.reserve(v.id, 2).await.unwrap());
        assert_eq!(store.stock_of(v.id).await.unwrap(), Some(1));

        store.release(v.id, 2).await.unwrap();
        assert_eq!(store.stock_of(v.id).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn reserve_unknown_variant_fails() {
        let store = InMemoryStore::new();
        assert!(!store.reserve(VariantId::new(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn place_order_rolls_back_partial_reservations() {
        let store = InMemoryStore::new();
        let product_id = ProductId::new();
        let plenty = variant(product_id, 10);
        let scarce = variant(product_id, 1);
        store.insert_variant(plenty.clone()).await;
        store.insert_variant(scarce.clone()).await;

        let user_id = UserId::new();
        let order = new_order(
            user_id,
            &[
                (product_id, Some(plenty.id), 4),
                (product_id, Some(scarce.id), 2),
            ],
        );

        let outcome = store.place_order(order).await.unwrap();
        assert_eq!(
            outcome,
            PlaceOrderOutcome::OutOfStock {
                variant_id: scarce.id,
                requested: 2
            }
        );
        assert_eq!(store.stock_of(plenty.id).await.unwrap(), Some(10));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn place_order_clears_cart() {
        let store = InMemoryStore::new();
        let product_id = ProductId::new();
        let v = variant(product_id, 5);
        store.insert_variant(v.clone()).await;
        let user_id = UserId::new();
        store
            .add_to_cart(
                user_id,
                CartLine {
                    product_id,
                    variant_id: Some(v.id),
                    quantity: 1,
                },
            )
            .await;

        let outcome = store
            .place_order(new_order(user_id, &[(product_id, Some(v.id), 1)]))
            .await
            .unwrap();

        assert!(matches!(outcome, PlaceOrderOutcome::Placed(_)));
        assert!(store.cart_lines(user_id).await.unwrap().is_empty());
        assert_eq!(store.stock_of(v.id).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn complete_payment_is_compare_and_set() {
        let store = InMemoryStore::new();
        let order = new_order(UserId::new(), &[]);
        let order_id = order.id;
        store.place_order(order).await.unwrap();

        let settlement = PaymentSettlement {
            gateway_payment_id: Some("pay_1".to_string()),
            detail: json!({"verify": {"payment_status": "SUCCESS"}}),
        };
        assert_eq!(
            store.complete_payment(order_id, &settlement).await.unwrap(),
            Some(PaymentStatus::Unpaid)
        );
        assert_eq!(store.complete_payment(order_id, &settlement).await.unwrap(), None);
        assert!(!store.fail_payment(order_id, &settlement).await.unwrap());

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(order.status, FulfillmentStatus::Processing);
        assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn attach_payment_session_only_once() {
        let store = InMemoryStore::new();
        let order = new_order(UserId::new(), &[]);
        let order_id = order.id;
        store.place_order(order).await.unwrap();

        let session = PaymentSessionRecord {
            gateway_order_id: "cf_1".to_string(),
            payment_session_id: "session_1".to_string(),
            payment_method: "gateway".to_string(),
            response: json!({"order_status": "ACTIVE"}),
        };
        assert!(store.attach_payment_session(order_id, &session).await.unwrap());
        assert!(!store.attach_payment_session(order_id, &session).await.unwrap());

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.gateway_order_id.as_deref(), Some("cf_1"));
        assert_eq!(order.gateway_response["session"]["order_status"], "ACTIVE");
    }

    #[tokio::test]
    async fn record_detail_ignored_after_completion() {
        let store = InMemoryStore::new();
        let order = new_order(UserId::new(), &[]);
        let order_id = order.id;
        store.place_order(order).await.unwrap();

        assert!(
            store
                .record_payment_detail(order_id, &json!({"dropped": {}}))
                .await
                .unwrap()
        );
        store
            .complete_payment(order_id, &PaymentSettlement::default())
            .await
            .unwrap();
        assert!(
            !store
                .record_payment_detail(order_id, &json!({"dropped": {}}))
                .await
                .unwrap()
        );
    }
}
