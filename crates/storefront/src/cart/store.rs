//! Single-instance cart state container.
//!
//! Holds the last known-good cart, the status of the most recent request,
//! and its error. State is published through a `watch` channel; UIs
//! subscribe and re-read through the selectors.
//!
//! # Ordering
//!
//! Every mutation takes a [`MutationTicket`] before it suspends. When the
//! response comes back the store compares tickets instead of trusting
//! arrival order:
//!
//! - a cart is written only if its ticket is newer than the last one applied
//!   to the same cart ID (a response for a different cart ID replaces);
//! - nothing issued before the last [`CartStore::clear`] is ever written;
//! - `status`/`error` only follow the most recently issued ticket, so an
//!   older request finishing late cannot flip a spinner off.

use std::sync::atomic::{AtomicU64, Ordering};

use cartwheel_core::{CartId, RequestStatus};
use tokio::sync::watch;
use tracing::debug;

use crate::commerce::{Cart, CartTotals, LineItem};
use crate::error::SyncError;

/// Snapshot of the cart store.
#[derive(Debug, Clone, Default)]
pub struct CartState {
    /// Status of the most recently issued request.
    pub status: RequestStatus,
    /// Error of the most recently issued request, if it failed.
    pub error: Option<SyncError>,
    /// Last known-good cart.
    pub cart: Option<Cart>,
    applied_seq: u64,
    cleared_seq: u64,
}

/// Sequence number handed to a mutation when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MutationTicket {
    seq: u64,
}

impl MutationTicket {
    /// The ticket's sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

/// How a settled response should touch the state.
enum Outcome {
    Cart(Cart, RequestStatus, Option<SyncError>),
    Failure(SyncError),
}

/// The cart store.
///
/// Only the orchestrator writes to it; everything else reads.
#[derive(Debug)]
pub struct CartStore {
    state: watch::Sender<CartState>,
    issued: AtomicU64,
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    /// Create an empty store in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(CartState::default()),
            issued: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Mutations (orchestrator only)
    // =========================================================================

    /// Start a mutation: issue a ticket and mark the store `Loading`.
    pub(crate) fn begin(&self) -> MutationTicket {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.status = RequestStatus::Loading;
            state.error = None;
        });
        MutationTicket { seq }
    }

    /// Write a successful response.
    ///
    /// Returns `false` if the response was stale and dropped.
    pub(crate) fn apply(&self, ticket: MutationTicket, cart: Cart) -> bool {
        self.settle(ticket, Outcome::Cart(cart, RequestStatus::Succeeded, None))
    }

    /// Write the server's cart but report the operation as failed.
    ///
    /// Used when the transport succeeded and the business outcome did not
    /// (an ineligible coupon).
    pub(crate) fn apply_rejected(&self, ticket: MutationTicket, cart: Cart, error: SyncError) -> bool {
        self.settle(
            ticket,
            Outcome::Cart(cart, RequestStatus::Failed, Some(error)),
        )
    }

    /// Record a failure. The cart is left untouched.
    pub(crate) fn fail(&self, ticket: MutationTicket, error: SyncError) -> bool {
        self.settle(ticket, Outcome::Failure(error))
    }

    /// Drop the cart and return to `Idle`.
    ///
    /// Responses for mutations issued before this call are discarded.
    pub(crate) fn clear(&self) {
        let watermark = self.issued.load(Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.cart = None;
            state.status = RequestStatus::Idle;
            state.error = None;
            state.applied_seq = watermark;
            state.cleared_seq = watermark;
        });
    }

    /// Whether `ticket` was issued after the last [`CartStore::clear`].
    pub(crate) fn is_current(&self, ticket: MutationTicket) -> bool {
        ticket.seq > self.state.borrow().cleared_seq
    }

    fn settle(&self, ticket: MutationTicket, outcome: Outcome) -> bool {
        let latest = self.issued.load(Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if ticket.seq <= state.cleared_seq {
                debug!(seq = ticket.seq, "Dropping response issued before clear");
                return false;
            }
            let is_latest = ticket.seq == latest;

            match outcome {
                Outcome::Cart(cart, status, error) => {
                    let same_cart = state.cart.as_ref().is_some_and(|c| c.id == cart.id);
                    if same_cart && ticket.seq <= state.applied_seq {
                        debug!(
                            seq = ticket.seq,
                            applied = state.applied_seq,
                            cart_id = %cart.id,
                            "Dropping stale cart response"
                        );
                        return false;
                    }
                    state.cart = Some(cart);
                    state.applied_seq = ticket.seq;
                    if is_latest {
                        state.status = status;
                        state.error = error;
                    }
                    true
                }
                Outcome::Failure(error) => {
                    if !is_latest {
                        return false;
                    }
                    state.status = RequestStatus::Failed;
                    state.error = Some(error);
                    true
                }
            }
        })
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    /// Clone of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Current cart.
    #[must_use]
    pub fn cart(&self) -> Option<Cart> {
        self.state.borrow().cart.clone()
    }

    /// Current cart ID.
    #[must_use]
    pub fn cart_id(&self) -> Option<CartId> {
        self.state.borrow().cart.as_ref().map(|c| c.id.clone())
    }

    /// Status of the most recent request.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.state.borrow().status
    }

    /// Error of the most recent request.
    #[must_use]
    pub fn error(&self) -> Option<SyncError> {
        self.state.borrow().error.clone()
    }

    /// Lines of the current cart.
    #[must_use]
    pub fn line_items(&self) -> Vec<LineItem> {
        self.state
            .borrow()
            .cart
            .as_ref()
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    /// Server-computed totals of the current cart.
    #[must_use]
    pub fn totals(&self) -> Option<CartTotals> {
        self.state.borrow().cart.as_ref().map(Cart::totals)
    }

    /// Units across all lines (0 without a cart).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.state
            .borrow()
            .cart
            .as_ref()
            .map_or(0, Cart::item_count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::commerce::fake::cart_with;
    use crate::commerce::CommerceError;

    #[test]
    fn test_apply_sets_cart_and_status() {
        let store = CartStore::new();
        assert_eq!(store.status(), RequestStatus::Idle);

        let ticket = store.begin();
        assert_eq!(store.status(), RequestStatus::Loading);

        assert!(store.apply(ticket, cart_with("cart_1", &[("cali_1", 2)])));
        assert_eq!(store.status(), RequestStatus::Succeeded);
        assert_eq!(store.cart_id().unwrap().as_str(), "cart_1");
        assert_eq!(store.item_count(), 2);
        assert_eq!(store.line_items().len(), 1);
        assert!(store.totals().is_some());
    }

    #[test]
    fn test_stale_response_is_ignored() {
        let store = CartStore::new();
        let seed = store.begin();
        store.apply(seed, cart_with("cart_1", &[]));

        let first = store.begin();
        let second = store.begin();

        assert!(store.apply(second, cart_with("cart_1", &[("cali_1", 3)])));
        assert!(!store.apply(first, cart_with("cart_1", &[("cali_1", 1)])));

        assert_eq!(store.item_count(), 3);
        assert_eq!(store.status(), RequestStatus::Succeeded);
    }

    #[test]
    fn test_different_cart_id_replaces() {
        let store = CartStore::new();
        let first = store.begin();
        let second = store.begin();
        store.apply(second, cart_with("cart_1", &[]));

        assert!(store.apply(first, cart_with("cart_2", &[])));
        assert_eq!(store.cart_id().unwrap().as_str(), "cart_2");
    }

    #[test]
    fn test_status_follows_latest_ticket() {
        let store = CartStore::new();
        let first = store.begin();
        let second = store.begin();

        store.apply(first, cart_with("cart_1", &[("cali_1", 1)]));
        assert_eq!(store.status(), RequestStatus::Loading);

        assert!(!store.fail(first, SyncError::NoActiveCart));
        assert!(store.error().is_none());

        store.fail(second, CommerceError::Http("reset".to_string()).into());
        assert_eq!(store.status(), RequestStatus::Failed);
        assert!(store.error().is_some());
    }

    #[test]
    fn test_failure_keeps_last_good_cart() {
        let store = CartStore::new();
        let ticket = store.begin();
        store.apply(ticket, cart_with("cart_1", &[("cali_1", 1)]));

        let ticket = store.begin();
        store.fail(ticket, CommerceError::NotFound("line".to_string()).into());

        assert_eq!(store.status(), RequestStatus::Failed);
        assert_eq!(store.item_count(), 1);
    }

    #[test]
    fn test_apply_rejected_writes_cart_and_error() {
        let store = CartStore::new();
        let ticket = store.begin();
        store.apply_rejected(
            ticket,
            cart_with("cart_1", &[]),
            SyncError::InvalidOrIneligibleCoupon {
                code: "X".to_string(),
            },
        );
        assert_eq!(store.status(), RequestStatus::Failed);
        assert!(store.cart().is_some());
    }

    #[test]
    fn test_clear_discards_in_flight_responses() {
        let store = CartStore::new();
        let ticket = store.begin();
        store.clear();

        assert!(!store.apply(ticket, cart_with("cart_1", &[])));
        assert!(store.cart().is_none());
        assert_eq!(store.status(), RequestStatus::Idle);

        let ticket = store.begin();
        assert!(store.apply(ticket, cart_with("cart_2", &[])));
    }

    #[test]
    fn test_is_current_tracks_clear() {
        let store = CartStore::new();
        let before = store.begin();
        assert!(store.is_current(before));

        store.clear();
        let after = store.begin();

        assert!(!store.is_current(before));
        assert!(store.is_current(after));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = CartStore::new();
        let mut rx = store.subscribe();

        let ticket = store.begin();
        store.apply(ticket, cart_with("cart_1", &[]));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().cart.as_ref().unwrap().id.as_str(), "cart_1");
    }
}
