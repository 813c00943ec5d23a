//! Shared types for the storefront workspace.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{FulfillmentStatus, PaymentStatus, UnknownStatus};
pub use types::{OrderId, ProductId, UserId, VariantId};
