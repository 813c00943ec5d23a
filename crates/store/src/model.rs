//! Records persisted by the storefront store.

use chrono::{DateTime, Utc};
use common::{FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer account with the contact details the gateway and mailer need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// A catalog product.
///
/// Base prices apply to line items that do not name a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub base_price: Money,
    pub base_sale_price: Option<Money>,
}

/// A stock-bearing product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
}

/// One line of a customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

/// Shipping address copied onto the order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl std::fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {} {}, {}",
            self.street, self.city, self.state, self.zip, self.country
        )
    }
}

/// A purchased line with its price captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
    pub size: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
}

impl OrderItem {
    /// Returns the line total (captured price times quantity).
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// One checkout transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: FulfillmentStatus,
    pub payment_status: PaymentStatus,
    pub total: Money,
    pub shipping_address: ShippingAddress,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_session_id: Option<String>,
    pub payment_method: Option<String>,
    /// Audit trail of everything the gateway reported, keyed by source.
    pub gateway_response: serde_json::Value,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Returns true once a gateway session has been attached.
    pub fn has_payment_session(&self) -> bool {
        self.gateway_order_id.is_some()
    }
}

/// A line ready to be persisted with its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
    pub size: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
}

/// A fully priced order handed to [`OrderStore::place_order`](crate::OrderStore::place_order).
///
/// Every item that names a variant reserves `quantity` units of that variant
/// in the same unit of work that persists the order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub total: Money,
    pub shipping_address: ShippingAddress,
    pub estimated_delivery: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Materializes the persisted order record.
    pub fn into_order(self) -> Order {
        let items = self
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                product_id: item.product_id,
                variant_id: item.variant_id,
                product_name: item.product_name,
                quantity: item.quantity,
                price: item.price,
                size: item.size,
                color: item.color,
                material: item.material,
            })
            .collect();

        Order {
            id: self.id,
            user_id: self.user_id,
            status: FulfillmentStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            total: self.total,
            shipping_address: self.shipping_address,
            gateway_order_id: None,
            gateway_payment_id: None,
            payment_session_id: None,
            payment_method: None,
            gateway_response: serde_json::json!({}),
            tracking_number: None,
            estimated_delivery: Some(self.estimated_delivery),
            created_at: self.created_at,
            updated_at: self.created_at,
            items,
        }
    }
}

/// Result of an atomic checkout commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceOrderOutcome {
    /// Stock was reserved, the order persisted and the cart emptied.
    Placed(Order),

    /// A conditional stock decrement affected no rows; nothing was persisted.
    OutOfStock { variant_id: VariantId, requested: u32 },
}

/// Gateway session identifiers attached to an order exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSessionRecord {
    pub gateway_order_id: String,
    pub payment_session_id: String,
    pub payment_method: String,
    pub response: serde_json::Value,
}

/// Detail recorded alongside a payment transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaymentSettlement {
    pub gateway_payment_id: Option<String>,
    /// Object merged into the order's audit blob, e.g. `{"webhook": {...}}`.
    pub detail: serde_json::Value,
}

/// Merges the top-level keys of `patch` into `target`, the in-memory
/// equivalent of `jsonb || jsonb`.
pub(crate) fn merge_audit(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if !target.is_object() {
        *target = serde_json::json!({});
    }
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}
