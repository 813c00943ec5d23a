//! Order fulfillment and payment status enums.

use serde::{Deserialize, Serialize};

/// Error returned when parsing a status from its stored string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// Fulfillment status of an order, driven by administrators.
///
/// Orthogonal to [`PaymentStatus`]; the only automatic move is
/// `Pending -> Processing` when a payment is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    /// Order placed, awaiting payment confirmation.
    #[default]
    Pending,

    /// Payment confirmed, order is being prepared.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Order was cancelled.
    Cancelled,
}

impl FulfillmentStatus {
    pub const ALL: [FulfillmentStatus; 5] = [
        FulfillmentStatus::Pending,
        FulfillmentStatus::Processing,
        FulfillmentStatus::Shipped,
        FulfillmentStatus::Delivered,
        FulfillmentStatus::Cancelled,
    ];

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "PENDING",
            FulfillmentStatus::Processing => "PROCESSING",
            FulfillmentStatus::Shipped => "SHIPPED",
            FulfillmentStatus::Delivered => "DELIVERED",
            FulfillmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Position along the forward path; `Cancelled` sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            FulfillmentStatus::Pending => Some(0),
            FulfillmentStatus::Processing => Some(1),
            FulfillmentStatus::Shipped => Some(2),
            FulfillmentStatus::Delivered => Some(3),
            FulfillmentStatus::Cancelled => None,
        }
    }

    /// Returns true if moving to `next` goes backwards along
    /// `Pending -> Processing -> Shipped -> Delivered`, or reopens a cancelled order.
    pub fn is_regression_to(&self, next: FulfillmentStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(current), Some(next)) => next < current,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FulfillmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FulfillmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Payment status of an order.
///
/// State transitions:
/// ```text
/// Unpaid ──┬──► Completed   (terminal)
///          └──► Failed ───► Completed   (late success, flagged)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Returns true if a confirmed payment may be applied from this state.
    pub fn can_complete(&self) -> bool {
        !matches!(self, PaymentStatus::Completed)
    }

    /// Returns true if a payment failure may be applied from this state.
    pub fn can_fail(&self) -> bool {
        matches!(self, PaymentStatus::Unpaid)
    }

    /// Returns true if no transition is ever applied from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
