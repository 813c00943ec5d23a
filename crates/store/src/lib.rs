//! Persistence layer for the storefront.
//!
//! Exposes the storage capabilities the order and payment services depend on:
//! - catalog reads (products and variants)
//! - the inventory ledger (atomic stock reservation and release)
//! - the customer directory (contact details and carts)
//! - order records, including compare-and-set payment transitions
//!
//! Two implementations are provided: [`PostgresStore`] and [`InMemoryStore`].

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    CartLine, Customer, NewOrder, NewOrderItem, Order, OrderItem, PaymentSessionRecord,
    PaymentSettlement, PlaceOrderOutcome, Product, ShippingAddress, Variant,
};
pub use postgres::PostgresStore;
pub use store::{CatalogReader, CustomerDirectory, InventoryLedger, OrderStore, StorefrontStore};
