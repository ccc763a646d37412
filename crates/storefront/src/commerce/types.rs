//! Domain types for the remote commerce service.
//!
//! These mirror the JSON the service returns. Every entity is returned whole
//! (never as a delta), so the engine can replace its local copy wholesale and
//! never has to estimate totals on its own.

use cartwheel_core::{
    AddressId, CartId, CurrencyCode, CustomerId, FulfillmentStatus, LineItemId, OrderId,
    OrderStatus, PaymentStatus, Price, ProductId, PromotionId, RegionId, SalesChannelId,
    VariantId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cart::address::SavedAddress;

/// Free-form metadata attached to carts, lines, addresses, and customers.
pub type Metadata = Map<String, Value>;

// =============================================================================
// Cart Types
// =============================================================================

/// An address as stored on a cart or order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartAddress {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Cart line ID.
    pub id: LineItemId,
    /// Product variant this line sells.
    pub variant_id: Option<VariantId>,
    /// Parent product.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    /// Product title.
    #[serde(default)]
    pub title: String,
    /// Variant title (e.g., "M / Blue").
    #[serde(default)]
    pub variant_title: Option<String>,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Quantity (always at least 1 while the line exists).
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Line subtotal before discounts.
    #[serde(default)]
    pub subtotal: Decimal,
    /// Line total after discounts.
    #[serde(default)]
    pub total: Decimal,
    /// Free-form metadata (size, color, gift note).
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// A promotion applied to a cart.
///
/// The service does not say whether a submitted code was accepted; see
/// [`crate::cart::promotion`] for how that is inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Option<PromotionId>,
    /// Customer-facing code (absent for automatic promotions).
    pub code: Option<String>,
    #[serde(default)]
    pub is_automatic: bool,
}

/// A shopping cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Currency of every amount on the cart.
    #[serde(default)]
    pub currency_code: CurrencyCode,
    /// Region the cart is priced in.
    #[serde(default)]
    pub region_id: Option<RegionId>,
    /// Cart lines.
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_address: Option<CartAddress>,
    #[serde(default)]
    pub billing_address: Option<CartAddress>,
    /// Applied promotions.
    #[serde(default)]
    pub promotions: Vec<Promotion>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub total: Decimal,
    /// Set once the cart has been turned into an order.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Cart {
    /// Codes of the promotions currently applied to the cart.
    #[must_use]
    pub fn promotion_codes(&self) -> Vec<String> {
        self.promotions
            .iter()
            .filter_map(|p| p.code.clone())
            .collect()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// Server-computed totals as display-ready prices.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        let currency = self.currency_code;
        CartTotals {
            subtotal: Price::new(self.subtotal, currency),
            tax_total: Price::new(self.tax_total, currency),
            shipping_total: Price::new(self.shipping_total, currency),
            discount_total: Price::new(self.discount_total, currency),
            total: Price::new(self.total, currency),
        }
    }
}

/// Cart cost summary, exactly as computed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Price,
    pub tax_total: Price,
    pub shipping_total: Price,
    pub discount_total: Price,
    pub total: Price,
}

// =============================================================================
// Order Types
// =============================================================================

/// A line on a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: LineItemId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub variant_title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub total: Decimal,
}

/// A shipment for (part of) an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub id: String,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
}

/// A single payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

/// Payments collected against an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCollection {
    #[serde(default)]
    pub payments: Vec<Payment>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-friendly sequential number.
    #[serde(default)]
    pub display_id: Option<i64>,
    /// Coarse order status.
    #[serde(default)]
    pub status: OrderStatus,
    /// Fine-grained shipping progress (preferred for display).
    #[serde(default)]
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub currency_code: CurrencyCode,
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
    #[serde(default)]
    pub shipping_address: Option<CartAddress>,
    #[serde(default)]
    pub billing_address: Option<CartAddress>,
    #[serde(default)]
    pub fulfillments: Vec<Fulfillment>,
    #[serde(default)]
    pub payment_collections: Vec<PaymentCollection>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A page of the customer's orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

// =============================================================================
// Customer Types
// =============================================================================

/// The authenticated customer's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Saved addresses, in the loose shape the account pages edit.
    #[serde(default)]
    pub addresses: Vec<SavedAddress>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Customer {
    /// Product IDs saved to the customer's wishlist.
    #[must_use]
    pub fn wishlist(&self) -> Vec<ProductId> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("wishlist"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ProductId::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a saved address by ID.
    #[must_use]
    pub fn address(&self, id: &AddressId) -> Option<&SavedAddress> {
        self.addresses.iter().find(|a| a.id.as_ref() == Some(id))
    }

    /// Get the customer's full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => String::new(),
        }
    }
}

// =============================================================================
// Request Bodies
// =============================================================================

/// Body for creating a cart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateCartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_channel_id: Option<SalesChannelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Body for updating cart-level fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<crate::cart::address::AddressPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<crate::cart::address::AddressPayload>,
}

/// Body for adding a line to the cart.
#[derive(Debug, Clone, Serialize)]
pub struct AddLineItemRequest {
    pub variant_id: VariantId,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Body for updating an existing cart line.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateLineItemRequest {
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Body for adding or removing promotion codes.
#[derive(Debug, Clone, Serialize)]
pub struct PromoCodesRequest {
    pub promo_codes: Vec<String>,
}

// =============================================================================
// Responses
// =============================================================================

/// Error body returned by the service on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error category (e.g., `not_allowed`, `invalid_data`).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Raw result of completing a cart.
///
/// The service answers `200` either way and distinguishes the outcome only
/// by the `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CompleteCartResponse {
    /// The cart became an order.
    Order { order: Order },
    /// Completion was refused; the current cart comes back for correction.
    Cart {
        cart: Cart,
        #[serde(default)]
        error: Option<ErrorPayload>,
    },
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Query parameters forwarded verbatim on price/region-sensitive reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreQuery {
    pub region_id: Option<RegionId>,
    pub sales_channel_id: Option<SalesChannelId>,
    /// Additional caller-supplied parameters (e.g., `fields`).
    pub extra: Vec<(String, String)>,
}

impl StoreQuery {
    /// Append an extra parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Flatten into key/value pairs, region and sales channel first.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.extra.len() + 2);
        if let Some(region) = &self.region_id {
            pairs.push(("region_id".to_string(), region.to_string()));
        }
        if let Some(channel) = &self.sales_channel_id {
            pairs.push(("sales_channel_id".to_string(), channel.to_string()));
        }
        pairs.extend(self.extra.iter().cloned());
        pairs
    }
}
