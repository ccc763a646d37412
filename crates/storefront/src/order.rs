//! Remote order → UI order.
//!
//! Everything here is a pure function of the order payload. The timeline is
//! rebuilt on every read; nothing about it is stored.

use cartwheel_core::{
    CurrencyCode, FulfillmentStatus, OrderId, OrderStatus, OrderViewStatus, Price,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commerce::{CartAddress, Order, OrderLineItem};

/// Shown wherever the service left a field empty.
pub const PLACEHOLDER: &str = "—";

/// An order as the account pages show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    /// Shopper-facing number (e.g. `#1042`), falling back to the ID.
    pub number: String,
    pub status: OrderViewStatus,
    pub placed_at: Option<DateTime<Utc>>,
    /// `placed_at` formatted for display.
    pub placed_on: String,
    pub email: String,
    pub items: Vec<OrderItemView>,
    pub shipping_address: OrderAddressView,
    pub subtotal: String,
    pub shipping_total: String,
    pub tax_total: String,
    pub discount_total: String,
    pub total: String,
    pub timeline: Vec<TimelineStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemView {
    pub title: String,
    pub variant: String,
    pub quantity: u32,
    pub unit_price: String,
    pub total: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderAddressView {
    pub name: String,
    pub line_1: String,
    pub line_2: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

/// Fixed order progress steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStage {
    Placed,
    Payment,
    Shipped,
    Delivered,
}

impl TimelineStage {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Placed => "Placed",
            Self::Payment => "Payment",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineStep {
    pub stage: TimelineStage,
    pub completed: bool,
    pub date: Option<DateTime<Utc>>,
}

/// Map a remote order into its view.
#[must_use]
pub fn map_order(order: &Order) -> OrderView {
    let currency = order.currency_code;
    let status = derive_status(order);

    OrderView {
        id: order.id.clone(),
        number: order
            .display_id
            .map_or_else(|| order.id.to_string(), |n| format!("#{n}")),
        status,
        placed_at: order.created_at,
        placed_on: order
            .created_at
            .map_or_else(|| PLACEHOLDER.to_string(), |d| d.format("%d %b %Y").to_string()),
        email: text(order.email.as_deref()),
        items: order.items.iter().map(|i| map_item(i, currency)).collect(),
        shipping_address: map_address(order.shipping_address.as_ref()),
        subtotal: price(order.subtotal, currency),
        shipping_total: price(order.shipping_total, currency),
        tax_total: price(order.tax_total, currency),
        discount_total: price(order.discount_total, currency),
        total: price(order.total, currency),
        timeline: timeline(order, status),
    }
}

/// Shopper-facing status.
///
/// The fulfillment status wins whenever it says anything beyond "not
/// fulfilled"; otherwise the core order status decides.
#[must_use]
pub fn derive_status(order: &Order) -> OrderViewStatus {
    match order.fulfillment_status {
        Some(FulfillmentStatus::Canceled) => return OrderViewStatus::Cancelled,
        Some(FulfillmentStatus::Delivered) => return OrderViewStatus::Delivered,
        Some(f) if f.is_shipped() => return OrderViewStatus::Shipped,
        _ => {}
    }

    match order.status {
        OrderStatus::Canceled => OrderViewStatus::Cancelled,
        _ => OrderViewStatus::Processing,
    }
}

fn timeline(order: &Order, status: OrderViewStatus) -> Vec<TimelineStep> {
    let paid_at = order
        .payment_collections
        .iter()
        .flat_map(|c| &c.payments)
        .find_map(|p| p.captured_at);
    let shipped_at = order.fulfillments.iter().find_map(|f| f.shipped_at);
    let delivered_at = order.fulfillments.iter().find_map(|f| f.delivered_at);

    let paid = paid_at.is_some() || order.payment_status.is_some_and(|p| p.is_paid());
    let delivered = delivered_at.is_some() || status == OrderViewStatus::Delivered;
    let shipped = delivered || shipped_at.is_some() || status == OrderViewStatus::Shipped;

    vec![
        TimelineStep {
            stage: TimelineStage::Placed,
            completed: true,
            date: order.created_at,
        },
        TimelineStep {
            stage: TimelineStage::Payment,
            completed: paid,
            date: paid_at,
        },
        TimelineStep {
            stage: TimelineStage::Shipped,
            completed: shipped,
            date: shipped_at,
        },
        TimelineStep {
            stage: TimelineStage::Delivered,
            completed: delivered,
            date: delivered_at,
        },
    ]
}

fn map_item(item: &OrderLineItem, currency: CurrencyCode) -> OrderItemView {
    OrderItemView {
        title: text(item.title.as_deref()),
        variant: text(item.variant_title.as_deref()),
        quantity: item.quantity,
        unit_price: price(item.unit_price, currency),
        total: price(item.total, currency),
        thumbnail: item.thumbnail.clone().filter(|t| !t.trim().is_empty()),
    }
}

fn map_address(address: Option<&CartAddress>) -> OrderAddressView {
    let field = |get: fn(&CartAddress) -> Option<&str>| text(address.and_then(get));

    let name = address
        .map(|a| {
            [a.first_name.as_deref(), a.last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    OrderAddressView {
        name: text(Some(&name)),
        line_1: field(|a| a.address_1.as_deref()),
        line_2: field(|a| a.address_2.as_deref()),
        city: field(|a| a.city.as_deref()),
        province: field(|a| a.province.as_deref()),
        postal_code: field(|a| a.postal_code.as_deref()),
        country: address
            .and_then(|a| a.country_code.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map_or_else(|| PLACEHOLDER.to_string(), str::to_ascii_uppercase),
        phone: field(|a| a.phone.as_deref()),
    }
}

fn text(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| PLACEHOLDER.to_string(), str::to_string)
}

fn price(amount: Decimal, currency: CurrencyCode) -> String {
    Price::new(amount, currency).display()
}
