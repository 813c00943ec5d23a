use async_trait::async_trait;
use common::{FulfillmentStatus, OrderId, PaymentStatus, ProductId, UserId, VariantId};

use crate::{
    CartLine, Customer, NewOrder, Order, PaymentSessionRecord, PaymentSettlement,
    PlaceOrderOutcome, Product, Result, Variant,
};

/// Read-only access to the catalog.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Retrieves a product by ID.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Retrieves a variant by ID, regardless of which product owns it.
    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<Variant>>;

    /// Retrieves every variant of a product.
    async fn variants_for_product(&self, product_id: ProductId) -> Result<Vec<Variant>>;
}

/// The only component allowed to mutate stock.
///
/// Implementations must apply the sufficiency check and the decrement as one
/// atomic operation, never as a read followed by a write.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Reserves `quantity` units of a variant.
    ///
    /// Returns `false` when the variant does not have enough stock (or does
    /// not exist); stock is left untouched in that case.
    async fn reserve(&self, variant_id: VariantId, quantity: u32) -> Result<bool>;

    /// Returns previously reserved units to stock.
    async fn release(&self, variant_id: VariantId, quantity: u32) -> Result<()>;

    /// Current stock of a variant, if it exists.
    async fn stock_of(&self, variant_id: VariantId) -> Result<Option<u32>>;
}

/// Customer contact details and carts.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Retrieves a customer by ID.
    async fn get_customer(&self, user_id: UserId) -> Result<Option<Customer>>;

    /// Retrieves the lines in a customer's cart.
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>>;
}

/// Order persistence, including the compare-and-set payment transitions.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order atomically.
    ///
    /// Within one unit of work: reserves stock for every item naming a
    /// variant, inserts the order and its items, and empties the owner's
    /// cart. If any reservation fails nothing is persisted and
    /// [`PlaceOrderOutcome::OutOfStock`] is returned.
    async fn place_order(&self, order: NewOrder) -> Result<PlaceOrderOutcome>;

    /// Retrieves an order with its items.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Retrieves a customer's orders, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Attaches gateway session identifiers to an order.
    ///
    /// Applied only while no session is attached and the order is not paid.
    /// Returns `true` if this call won.
    async fn attach_payment_session(
        &self,
        order_id: OrderId,
        session: &PaymentSessionRecord,
    ) -> Result<bool>;

    /// Marks the payment completed and moves fulfillment to `Processing`.
    ///
    /// A single conditional update guarded by `payment_status <> COMPLETED`.
    /// Returns the status the order had before the update when this call
    /// applied the transition, or `None` if the order was already completed
    /// (or does not exist). Reopening a failed payment also records
    /// `"late_success": true` in the audit blob.
    async fn complete_payment(
        &self,
        order_id: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<Option<PaymentStatus>>;

    /// Marks the payment failed. Applied only while the order is unpaid.
    async fn fail_payment(&self, order_id: OrderId, settlement: &PaymentSettlement)
    -> Result<bool>;

    /// Merges detail into the audit blob without changing payment status.
    /// Ignored once the order is completed.
    async fn record_payment_detail(
        &self,
        order_id: OrderId,
        detail: &serde_json::Value,
    ) -> Result<bool>;

    /// Sets the fulfillment status, and the tracking number when given.
    ///
    /// Returns the updated order, or `None` if it does not exist.
    async fn update_fulfillment(
        &self,
        order_id: OrderId,
        status: FulfillmentStatus,
        tracking_number: Option<String>,
    ) -> Result<Option<Order>>;
}

/// Everything the storefront services need from a backing store.
pub trait StorefrontStore:
    CatalogReader + InventoryLedger + CustomerDirectory + OrderStore + Clone + 'static
{
}

impl<T> StorefrontStore for T where
    T: CatalogReader + InventoryLedger + CustomerDirectory + OrderStore + Clone + 'static
{
}
