//! Remote commerce service client.
//!
//! # Architecture
//!
//! - [`CommerceApi`] is the seam between the engine and the service; the
//!   engine only ever talks to the trait, so tests swap in a fake
//! - [`CommerceClient`] is the `reqwest` implementation against the REST
//!   store API
//! - The service is the source of truth: every mutation returns the whole
//!   entity and nothing is computed locally
//! - Order lookups are cached via `moka` (5 minute TTL); carts never are
//!
//! # Example
//!
//! ```rust,ignore
//! use cartwheel_storefront::commerce::{CommerceApi, CommerceClient};
//!
//! let client = CommerceClient::new(&config)?;
//! let cart = client.create_cart(&CreateCartRequest::default()).await?;
//! let cart = client
//!     .add_line_item(&cart.id, &AddLineItemRequest {
//!         variant_id: VariantId::new("variant_1"),
//!         quantity: 1,
//!         metadata: None,
//!     })
//!     .await?;
//! ```

mod cache;
mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod types;

pub use client::CommerceClient;
pub use types::*;

use async_trait::async_trait;
use cartwheel_core::{CartId, LineItemId, OrderId};
use thiserror::Error;

/// Errors that can occur when talking to the commerce service.
///
/// `Clone` so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommerceError {
    /// The request never produced a response (DNS, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The bearer token was rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The service answered with a non-success status.
    #[error("Service error ({status}): {}", .payload.message)]
    Service {
        /// HTTP status code.
        status: u16,
        /// Error body as returned by the service.
        payload: ErrorPayload,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(String),
}

impl CommerceError {
    /// The service's error payload, if the failure carried one.
    #[must_use]
    pub const fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Service { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CommerceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for CommerceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Operations the engine needs from the commerce service.
///
/// Every cart operation returns the full updated [`Cart`]; callers replace
/// their copy wholesale.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Create a new cart.
    async fn create_cart(&self, request: &CreateCartRequest) -> Result<Cart, CommerceError>;

    /// Retrieve a cart by ID.
    async fn retrieve_cart(&self, id: &CartId, query: &StoreQuery) -> Result<Cart, CommerceError>;

    /// Update cart-level fields (email, addresses).
    async fn update_cart(
        &self,
        id: &CartId,
        request: &UpdateCartRequest,
    ) -> Result<Cart, CommerceError>;

    /// Add a line to the cart.
    async fn add_line_item(
        &self,
        id: &CartId,
        request: &AddLineItemRequest,
    ) -> Result<Cart, CommerceError>;

    /// Update quantity/metadata of an existing line.
    async fn update_line_item(
        &self,
        id: &CartId,
        line_id: &LineItemId,
        request: &UpdateLineItemRequest,
    ) -> Result<Cart, CommerceError>;

    /// Remove a line from the cart.
    async fn delete_line_item(
        &self,
        id: &CartId,
        line_id: &LineItemId,
    ) -> Result<Cart, CommerceError>;

    /// Submit promotion codes. A `200` does not mean the codes were accepted.
    async fn add_promotions(&self, id: &CartId, codes: &[String]) -> Result<Cart, CommerceError>;

    /// Remove promotion codes.
    async fn remove_promotions(&self, id: &CartId, codes: &[String])
    -> Result<Cart, CommerceError>;

    /// Turn the cart into an order.
    async fn complete_cart(
        &self,
        id: &CartId,
        query: &StoreQuery,
    ) -> Result<CompleteCartResponse, CommerceError>;

    /// Retrieve an order, optionally as the authenticated customer.
    async fn retrieve_order(
        &self,
        id: &OrderId,
        token: Option<&str>,
        query: &StoreQuery,
    ) -> Result<Order, CommerceError>;

    /// List the authenticated customer's orders.
    async fn list_orders(
        &self,
        token: &str,
        limit: u32,
        offset: u32,
    ) -> Result<OrderList, CommerceError>;

    /// Fetch the authenticated customer's profile.
    async fn current_customer(&self, token: &str) -> Result<Customer, CommerceError>;

    /// Replace the authenticated customer's metadata.
    async fn update_customer_metadata(
        &self,
        token: &str,
        metadata: &Metadata,
    ) -> Result<Customer, CommerceError>;

    /// Exchange email/password for a bearer token.
    async fn login(&self, email: &str, password: &str) -> Result<String, CommerceError>;

    /// Drop any orders cached for the current identity.
    ///
    /// Called whenever the session token changes.
    fn forget_cached_orders(&self) {}
}
