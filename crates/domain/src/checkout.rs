//! Checkout: turns line items into a priced, stock-reserved order.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{Duration, Utc};
use common::{Money, OrderId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use store::{
    CartLine, NewOrder, NewOrderItem, Order, PlaceOrderOutcome, Product, ShippingAddress,
    StorefrontStore, Variant,
};

use crate::access::Role;
use crate::error::OrderError;
use crate::notify::{Notifier, send_order_confirmation};
use crate::pricing;

/// Days added to the order date for the delivery estimate.
pub const ESTIMATED_DELIVERY_DAYS: i64 = 5;

/// One requested line: a product, optionally narrowed to a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

impl LineItemRequest {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>, quantity: u32) -> Self {
        Self {
            product_id,
            variant_id,
            quantity,
        }
    }
}

impl From<CartLine> for LineItemRequest {
    fn from(line: CartLine) -> Self {
        Self::new(line.product_id, line.variant_id, line.quantity)
    }
}

/// Validates and merges requested lines.
///
/// Lines naming the same product and variant are combined, keeping the
/// position of the first occurrence.
fn merge_lines(lines: Vec<LineItemRequest>) -> Result<Vec<LineItemRequest>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut merged: Vec<LineItemRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        match merged
            .iter_mut()
            .find(|m| m.product_id == line.product_id && m.variant_id == line.variant_id)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(line),
        }
    }
    Ok(merged)
}

/// Service assembling orders from line items.
///
/// Validation runs in three passes so the failure reported is always the
/// first kind that applies: unknown products, then unknown or foreign
/// variants, then insufficient stock. The reservation itself happens inside
/// [`OrderStore::place_order`](store::OrderStore::place_order), so a
/// concurrent checkout that drains stock after validation still surfaces as
/// [`OrderError::InsufficientStock`] with nothing persisted.
pub struct CheckoutService<S, N>
where
    S: StorefrontStore,
    N: Notifier,
{
    store: S,
    notifier: N,
}

impl<S, N> CheckoutService<S, N>
where
    S: StorefrontStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates an order from explicit line items.
    #[tracing::instrument(
        skip(self, shipping_address, line_items),
        fields(lines = line_items.len())
    )]
    pub async fn create_order(
        &self,
        user_id: UserId,
        shipping_address: ShippingAddress,
        line_items: Vec<LineItemRequest>,
    ) -> Result<Order, OrderError> {
        let start = Instant::now();
        let result = self.assemble(user_id, shipping_address, line_items).await;
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_orders_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total, "Order placed");
                send_order_confirmation(&self.store, &self.notifier, order).await;
            }
            Err(e) => {
                metrics::counter!("checkout_rejected_total", "reason" => e.reason()).increment(1);
                tracing::info!(error = %e, "Checkout rejected");
            }
        }

        result
    }

    /// Creates an order from the lines currently in the user's cart.
    #[tracing::instrument(skip(self, shipping_address))]
    pub async fn checkout_cart(
        &self,
        user_id: UserId,
        shipping_address: ShippingAddress,
    ) -> Result<Order, OrderError> {
        let lines = self
            .store
            .cart_lines(user_id)
            .await?
            .into_iter()
            .map(LineItemRequest::from)
            .collect();
        self.create_order(user_id, shipping_address, lines).await
    }

    /// Retrieves an order visible to the caller: its owner, or an administrator.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: UserId,
        role: Role,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if order.user_id != user_id && !role.is_admin() {
            return Err(OrderError::AccessDenied(order_id));
        }
        Ok(order)
    }

    /// Lists the caller's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }

    async fn assemble(
        &self,
        user_id: UserId,
        shipping_address: ShippingAddress,
        line_items: Vec<LineItemRequest>,
    ) -> Result<Order, OrderError> {
        let lines = merge_lines(line_items)?;

        let mut products: HashMap<ProductId, Product> = HashMap::new();
        for line in &lines {
            if products.contains_key(&line.product_id) {
                continue;
            }
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            products.insert(line.product_id, product);
        }

        let mut variants: HashMap<VariantId, Variant> = HashMap::new();
        for line in &lines {
            let Some(variant_id) = line.variant_id else {
                continue;
            };
            let variant = self
                .store
                .get_variant(variant_id)
                .await?
                .filter(|v| v.product_id == line.product_id)
                .ok_or(OrderError::VariantNotFound {
                    product_id: line.product_id,
                    variant_id,
                })?;
            variants.insert(variant_id, variant);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = &products[&line.product_id];
            let item = match line.variant_id.map(|id| &variants[&id]) {
                Some(variant) => {
                    check_stock(line, variant.stock)?;
                    NewOrderItem {
                        product_id: product.id,
                        variant_id: Some(variant.id),
                        product_name: product.name.clone(),
                        quantity: line.quantity,
                        price: pricing::variant_unit_price(variant),
                        size: variant.size.clone(),
                        color: variant.color.clone(),
                        material: variant.material.clone(),
                    }
                }
                None => {
                    let all = self.store.variants_for_product(product.id).await?;
                    check_stock(line, pricing::product_available_stock(&all))?;
                    NewOrderItem {
                        product_id: product.id,
                        variant_id: None,
                        product_name: product.name.clone(),
                        quantity: line.quantity,
                        price: pricing::product_unit_price(product),
                        size: None,
                        color: None,
                        material: None,
                    }
                }
            };
            items.push(item);
        }

        let total = items
            .iter()
            .try_fold(Money::zero(), |total, i| {
                total.checked_add(i.price.checked_multiply(i.quantity)?)
            })
            .ok_or(OrderError::AmountOverflow)?;
        let now = Utc::now();
        let new_order = NewOrder {
            id: OrderId::new(),
            user_id,
            total,
            shipping_address,
            estimated_delivery: now + Duration::days(ESTIMATED_DELIVERY_DAYS),
            created_at: now,
            items,
        };

        match self.store.place_order(new_order).await? {
            PlaceOrderOutcome::Placed(order) => Ok(order),
            PlaceOrderOutcome::OutOfStock {
                variant_id,
                requested,
            } => {
                // Lost a race with another checkout after validation passed.
                let product_id = lines
                    .iter()
                    .find(|l| l.variant_id == Some(variant_id))
                    .map(|l| l.product_id)
                    .unwrap_or_default();
                let available = self.store.stock_of(variant_id).await?.unwrap_or(0);
                Err(OrderError::InsufficientStock {
                    product_id,
                    variant_id: Some(variant_id),
                    requested,
                    available,
                })
            }
        }
    }
}

fn check_stock(line: &LineItemRequest, available: u32) -> Result<(), OrderError> {
    if available < line.quantity {
        return Err(OrderError::InsufficientStock {
            product_id: line.product_id,
            variant_id: line.variant_id,
            requested: line.quantity,
            available,
        });
    }
    Ok(())
}
