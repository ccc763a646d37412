//! Status enums for remote entities and local request tracking.
//!
//! Remote enums use `#[serde(other)]` so a status the commerce service adds
//! later deserializes as `Unknown` instead of failing the whole payload.

use serde::{Deserialize, Serialize};

/// Lifecycle of the most recent cart request, as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// No request has been issued yet (or the cart was cleared).
    #[default]
    Idle,
    /// A request is in flight.
    Loading,
    /// The last request resolved and its result was applied.
    Succeeded,
    /// The last request was rejected.
    Failed,
}

/// Coarse order status (from the commerce service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Draft,
    Archived,
    #[serde(alias = "cancelled")]
    Canceled,
    RequiresAction,
    #[serde(other)]
    Unknown,
}

/// Order fulfillment status (from the commerce service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    NotFulfilled,
    PartiallyFulfilled,
    Fulfilled,
    PartiallyShipped,
    Shipped,
    PartiallyDelivered,
    Delivered,
    #[serde(alias = "cancelled")]
    Canceled,
    #[serde(other)]
    Unknown,
}

impl FulfillmentStatus {
    /// Whether goods have left the warehouse (any shipped/fulfilled variant).
    #[must_use]
    pub const fn is_shipped(&self) -> bool {
        matches!(
            self,
            Self::PartiallyFulfilled
                | Self::Fulfilled
                | Self::PartiallyShipped
                | Self::Shipped
                | Self::PartiallyDelivered
        )
    }
}

/// Order payment status (from the commerce service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    NotPaid,
    Awaiting,
    Authorized,
    PartiallyAuthorized,
    Captured,
    PartiallyCaptured,
    PartiallyRefunded,
    Refunded,
    #[serde(alias = "cancelled")]
    Canceled,
    RequiresAction,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Whether the customer's payment has been secured.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(
            self,
            Self::Authorized
                | Self::Captured
                | Self::PartiallyCaptured
                | Self::PartiallyRefunded
                | Self::Refunded
        )
    }
}

/// UI-facing order status shown to shoppers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderViewStatus {
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl std::fmt::Display for OrderViewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
