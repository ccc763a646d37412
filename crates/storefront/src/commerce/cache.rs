//! Order cache for read-only lookups.

use std::time::Duration;

use cartwheel_core::OrderId;
use moka::future::Cache;

use super::types::Order;

/// Placed orders keyed by ID.
///
/// Orders are immutable from the shopper's point of view between page
/// loads, so a short TTL is enough to absorb repeated detail-page reads.
pub type OrderCache = Cache<OrderId, Order>;

/// Build the order cache (5 minute TTL, 1000 entries).
pub fn order_cache() -> OrderCache {
    Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(300)) // 5 minutes
        .build()
}
