//! Cart operations against the commerce service.
//!
//! The orchestrator is the only sanctioned writer of the [`CartStore`]. Each
//! operation takes a mutation ticket, calls the service, and writes the
//! whole returned cart back. Nothing is estimated locally.

use std::future::Future;
use std::sync::Arc;

use cartwheel_core::{CartId, Email, LineItemId, RegionId, SalesChannelId, VariantId};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::cart::address::{AddressRole, SavedAddress, map_address};
use crate::cart::promotion::{DiffPromotionCheck, PromotionCheck, PromotionSnapshot};
use crate::cart::store::{CartStore, MutationTicket};
use crate::commerce::{
    AddLineItemRequest, Cart, CommerceApi, CommerceError, CompleteCartResponse, CreateCartRequest,
    ErrorPayload, Metadata, Order, StoreQuery, UpdateCartRequest, UpdateLineItemRequest,
};
use crate::config::SyncConfig;
use crate::error::{SyncError, add_breadcrumb};
use crate::session::RequestCoordinator;
use crate::storage::{ClientStorage, keys};

const ENSURE_CART_KEY: &str = "cart:ensure";
const NOTICE_CAPACITY: usize = 32;

/// Coordinator type used for cart creation.
pub type CartCoordinator = RequestCoordinator<Cart, SyncError>;

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Cart-level settings taken from configuration.
#[derive(Debug, Clone)]
pub struct CartSettings {
    /// Region forwarded on cart creation and price-sensitive reads.
    pub region_id: Option<RegionId>,
    /// Sales channel forwarded on cart creation and price-sensitive reads.
    pub sales_channel_id: Option<SalesChannelId>,
    /// Country used for saved addresses without one.
    pub default_country: String,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            region_id: None,
            sales_channel_id: None,
            default_country: "in".to_string(),
        }
    }
}

impl CartSettings {
    /// Take the cart settings out of the engine configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            region_id: config.region_id.clone(),
            sales_channel_id: config.sales_channel_id.clone(),
            default_country: config.default_country.clone(),
        }
    }

    /// Query forwarded on price/region-sensitive reads.
    #[must_use]
    pub fn query(&self) -> StoreQuery {
        StoreQuery {
            region_id: self.region_id.clone(),
            sales_channel_id: self.sales_channel_id.clone(),
            extra: Vec::new(),
        }
    }
}

/// A line to add to the cart.
#[derive(Debug, Clone)]
pub struct LineItemInput {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub metadata: Option<Metadata>,
}

impl LineItemInput {
    /// One unit of `variant_id`.
    #[must_use]
    pub fn new(variant_id: impl Into<VariantId>) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity: 1,
            metadata: None,
        }
    }

    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// New quantity (and optionally metadata) for an existing line.
#[derive(Debug, Clone)]
pub struct LineItemUpdate {
    /// `0` removes the line.
    pub quantity: u32,
    pub metadata: Option<Metadata>,
}

impl LineItemUpdate {
    #[must_use]
    pub const fn quantity(quantity: u32) -> Self {
        Self {
            quantity,
            metadata: None,
        }
    }
}

/// Options for address updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressUpdateOptions {
    /// Skip the success notice (e.g., when billing is copied from shipping).
    pub silent: bool,
}

/// User-facing outcome messages, for toasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Result of completing a cart.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The cart became an order.
    Order(Order),
    /// The service refused to complete the cart. `cart` is its current state
    /// and is what the store now holds.
    Rejected {
        cart: Cart,
        error: Option<ErrorPayload>,
    },
}

impl CompletionOutcome {
    /// The order, if one was placed.
    #[must_use]
    pub const fn order(&self) -> Option<&Order> {
        match self {
            Self::Order(order) => Some(order),
            Self::Rejected { .. } => None,
        }
    }

    /// Message explaining a rejection.
    #[must_use]
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            Self::Order(_) => None,
            Self::Rejected { error, .. } => Some(
                error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Your order could not be completed.".to_string()),
            ),
        }
    }
}

// =============================================================================
// CartOrchestrator
// =============================================================================

/// Entry points for every cart mutation.
#[derive(Clone)]
pub struct CartOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    api: Arc<dyn CommerceApi>,
    store: Arc<CartStore>,
    storage: Arc<dyn ClientStorage>,
    coordinator: Arc<CartCoordinator>,
    promotion_check: Box<dyn PromotionCheck>,
    notices: broadcast::Sender<Notice>,
    settings: CartSettings,
}

impl CartOrchestrator {
    /// Create an orchestrator using the diff-based promotion check.
    #[must_use]
    pub fn new(
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn ClientStorage>,
        coordinator: Arc<CartCoordinator>,
        settings: CartSettings,
    ) -> Self {
        Self::with_promotion_check(api, storage, coordinator, settings, DiffPromotionCheck)
    }

    /// Create an orchestrator with a custom promotion check.
    #[must_use]
    pub fn with_promotion_check(
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn ClientStorage>,
        coordinator: Arc<CartCoordinator>,
        settings: CartSettings,
        promotion_check: impl PromotionCheck + 'static,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(OrchestratorInner {
                api,
                store: Arc::new(CartStore::new()),
                storage,
                coordinator,
                promotion_check: Box::new(promotion_check),
                notices,
                settings,
            }),
        }
    }

    /// The cart store (read-only for everyone but the orchestrator).
    #[must_use]
    pub fn store(&self) -> &CartStore {
        &self.inner.store
    }

    /// Subscribe to success/error notices.
    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    // =========================================================================
    // ensure / fetch / clear
    // =========================================================================

    /// Return the session's cart, creating one if needed.
    ///
    /// Reuses the stored cart ID while it still resolves to an open cart.
    /// Concurrent calls share a single flight. On failure the stored ID is
    /// kept so a retry can pick it up.
    ///
    /// # Errors
    ///
    /// Returns the service error if the cart can be neither retrieved nor
    /// created.
    #[instrument(skip(self))]
    pub async fn ensure_cart(&self) -> Result<Cart, SyncError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .coordinator
            .run(ENSURE_CART_KEY, move || inner.ensure_cart_flight())
            .await
    }

    /// Refresh the store from the service.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoActiveCart` without a cart, otherwise the
    /// service error.
    #[instrument(skip(self))]
    pub async fn fetch_cart(&self, cart_id: Option<&CartId>) -> Result<Cart, SyncError> {
        let cart_id = self.require_cart_id(cart_id)?;
        let query = self.inner.settings.query();
        self.mutate(self.inner.api.retrieve_cart(&cart_id, &query))
            .await
    }

    /// Forget the current cart locally.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the stored cart ID cannot be removed.
    pub fn clear_cart(&self) -> Result<(), SyncError> {
        self.inner.store.clear();
        self.inner.storage.remove(keys::CART_ID)?;
        add_breadcrumb("cart", "Cleared cart", None);
        Ok(())
    }

    // =========================================================================
    // Line items
    // =========================================================================

    /// Add a line, creating the cart first if there is none.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidQuantity` for a zero quantity (before any
    /// request), otherwise the service error.
    #[instrument(skip(self, input), fields(variant_id = %input.variant_id, quantity = input.quantity))]
    pub async fn add_line_item(
        &self,
        cart_id: Option<&CartId>,
        input: LineItemInput,
    ) -> Result<Cart, SyncError> {
        if input.quantity == 0 {
            return Err(SyncError::InvalidQuantity(0));
        }

        let cart_id = match self.resolve_cart_id(cart_id)? {
            Some(id) => id,
            None => self.ensure_cart().await?.id,
        };

        add_breadcrumb(
            "cart",
            "Adding line item",
            Some(&[("variant_id", input.variant_id.as_str())]),
        );

        let request = AddLineItemRequest {
            variant_id: input.variant_id,
            quantity: input.quantity,
            metadata: input.metadata,
        };
        let cart = self
            .mutate(self.inner.api.add_line_item(&cart_id, &request))
            .await?;
        self.notify(Notice::Success("Added to cart".to_string()));
        Ok(cart)
    }

    /// Change a line's quantity/metadata. A quantity of `0` removes it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoActiveCart` without a cart, otherwise the
    /// service error.
    #[instrument(skip(self, update), fields(quantity = update.quantity))]
    pub async fn update_line_item(
        &self,
        cart_id: Option<&CartId>,
        line_id: &LineItemId,
        update: LineItemUpdate,
    ) -> Result<Cart, SyncError> {
        if update.quantity == 0 {
            return self.delete_line_item(cart_id, line_id).await;
        }
        let cart_id = self.require_cart_id(cart_id)?;

        add_breadcrumb(
            "cart",
            "Updating line item",
            Some(&[("line_id", line_id.as_str())]),
        );

        let request = UpdateLineItemRequest {
            quantity: update.quantity,
            metadata: update.metadata,
        };
        let cart = self
            .mutate(self.inner.api.update_line_item(&cart_id, line_id, &request))
            .await?;
        self.notify(Notice::Success("Cart updated".to_string()));
        Ok(cart)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoActiveCart` without a cart, otherwise the
    /// service error.
    #[instrument(skip(self))]
    pub async fn delete_line_item(
        &self,
        cart_id: Option<&CartId>,
        line_id: &LineItemId,
    ) -> Result<Cart, SyncError> {
        let cart_id = self.require_cart_id(cart_id)?;

        add_breadcrumb(
            "cart",
            "Removing line item",
            Some(&[("line_id", line_id.as_str())]),
        );

        let cart = self
            .mutate(self.inner.api.delete_line_item(&cart_id, line_id))
            .await?;
        self.notify(Notice::Success("Removed from cart".to_string()));
        Ok(cart)
    }

    // =========================================================================
    // Promotions
    // =========================================================================

    /// Apply a promotion code.
    ///
    /// The service answers `200` whether or not the code took effect, so the
    /// cart is compared before and after the call. A code that is already
    /// on the cart succeeds without a request.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidOrIneligibleCoupon` when the call succeeded
    /// but the code had no effect (the returned cart is still written to the
    /// store), otherwise the service error.
    #[instrument(skip(self))]
    pub async fn apply_promotion_code(
        &self,
        cart_id: Option<&CartId>,
        code: &str,
    ) -> Result<Cart, SyncError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SyncError::InvalidOrIneligibleCoupon {
                code: String::new(),
            });
        }
        let cart_id = self.require_cart_id(cart_id)?;

        let before_cart = match self.inner.store.cart() {
            Some(cart) if cart.id == cart_id => cart,
            _ => self.fetch_cart(Some(&cart_id)).await?,
        };
        let before = PromotionSnapshot::of(&before_cart);

        if before.contains(code) {
            debug!(code, "Promotion already applied");
            self.notify(Notice::Success(format!("Coupon {code} is already applied")));
            return Ok(before_cart);
        }

        add_breadcrumb("cart", "Applying promotion", Some(&[("code", code)]));

        let ticket = self.inner.store.begin();
        let cart = match self
            .inner
            .api
            .add_promotions(&cart_id, &[code.to_string()])
            .await
        {
            Ok(cart) => cart,
            Err(e) => return Err(self.settle_failure(ticket, e.into())),
        };

        let after = PromotionSnapshot::of(&cart);
        if self.inner.promotion_check.accepted(code, &before, &after) {
            info!(code, "Promotion applied");
            self.inner.store.apply(ticket, cart.clone());
            self.notify(Notice::Success(format!("Coupon {code} applied")));
            Ok(cart)
        } else {
            warn!(code, "Promotion had no effect");
            let error = SyncError::InvalidOrIneligibleCoupon {
                code: code.to_string(),
            };
            self.inner.store.apply_rejected(ticket, cart, error.clone());
            self.notify(Notice::Error(error.user_message()));
            Err(error)
        }
    }

    /// Remove a promotion code. The service's answer is trusted as-is.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoActiveCart` without a cart, otherwise the
    /// service error.
    #[instrument(skip(self))]
    pub async fn remove_promotion_code(
        &self,
        cart_id: Option<&CartId>,
        code: &str,
    ) -> Result<Cart, SyncError> {
        let cart_id = self.require_cart_id(cart_id)?;
        let code = code.trim().to_string();

        add_breadcrumb("cart", "Removing promotion", Some(&[("code", code.as_str())]));

        let cart = self
            .mutate(
                self.inner
                    .api
                    .remove_promotions(&cart_id, std::slice::from_ref(&code)),
            )
            .await?;
        self.notify(Notice::Success(format!("Coupon {code} removed")));
        Ok(cart)
    }

    // =========================================================================
    // Contact details
    // =========================================================================

    /// Set the cart's shipping address from a saved address.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingAddress` or `SyncError::Address` before any
    /// request, otherwise the service error.
    pub async fn update_cart_shipping_address(
        &self,
        cart_id: Option<&CartId>,
        address: Option<&SavedAddress>,
        options: AddressUpdateOptions,
    ) -> Result<Cart, SyncError> {
        self.update_cart_address(cart_id, address, AddressRole::Shipping, options)
            .await
    }

    /// Set the cart's billing address from a saved address.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingAddress` or `SyncError::Address` before any
    /// request, otherwise the service error.
    pub async fn update_cart_billing_address(
        &self,
        cart_id: Option<&CartId>,
        address: Option<&SavedAddress>,
        options: AddressUpdateOptions,
    ) -> Result<Cart, SyncError> {
        self.update_cart_address(cart_id, address, AddressRole::Billing, options)
            .await
    }

    #[instrument(skip(self, address), fields(role = %role))]
    async fn update_cart_address(
        &self,
        cart_id: Option<&CartId>,
        address: Option<&SavedAddress>,
        role: AddressRole,
        options: AddressUpdateOptions,
    ) -> Result<Cart, SyncError> {
        let address = address.ok_or(SyncError::MissingAddress)?;
        let payload = map_address(address, role, &self.inner.settings.default_country)?;
        let cart_id = self.require_cart_id(cart_id)?;

        let request = match role {
            AddressRole::Shipping => UpdateCartRequest {
                shipping_address: Some(payload),
                ..UpdateCartRequest::default()
            },
            AddressRole::Billing => UpdateCartRequest {
                billing_address: Some(payload),
                ..UpdateCartRequest::default()
            },
        };

        let role_name = role.to_string();
        add_breadcrumb(
            "cart",
            "Updating address",
            Some(&[("role", role_name.as_str())]),
        );

        let cart = self
            .mutate(self.inner.api.update_cart(&cart_id, &request))
            .await?;
        if !options.silent {
            let message = match role {
                AddressRole::Shipping => "Shipping address updated",
                AddressRole::Billing => "Billing address updated",
            };
            self.notify(Notice::Success(message.to_string()));
        }
        Ok(cart)
    }

    /// Set the cart's contact email.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidEmail` before any request if the email is
    /// malformed, otherwise the service error.
    #[instrument(skip(self, email))]
    pub async fn update_cart_email(
        &self,
        cart_id: Option<&CartId>,
        email: &str,
    ) -> Result<Cart, SyncError> {
        let email = Email::parse(email)?;
        let cart_id = self.require_cart_id(cart_id)?;

        let request = UpdateCartRequest {
            email: Some(email.into()),
            ..UpdateCartRequest::default()
        };
        self.mutate(self.inner.api.update_cart(&cart_id, &request))
            .await
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Turn the cart into an order.
    ///
    /// A refusal by the service is not an error: it resolves to
    /// [`CompletionOutcome::Rejected`] with the service's current cart,
    /// which replaces the stored one. A placed order clears the cart.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoActiveCart` without a cart, or the service error
    /// when the call itself fails (the existing cart is kept).
    #[instrument(skip(self, query))]
    pub async fn complete_cart(
        &self,
        cart_id: Option<&CartId>,
        query: Option<StoreQuery>,
    ) -> Result<CompletionOutcome, SyncError> {
        let cart_id = self.require_cart_id(cart_id)?;
        let query = query.unwrap_or_else(|| self.inner.settings.query());

        add_breadcrumb(
            "cart",
            "Completing cart",
            Some(&[("cart_id", cart_id.as_str())]),
        );

        let ticket = self.inner.store.begin();
        let response = match self.inner.api.complete_cart(&cart_id, &query).await {
            Ok(response) => response,
            Err(e) => return Err(self.settle_failure(ticket, e.into())),
        };

        match response {
            CompleteCartResponse::Order { order } => {
                info!(order_id = %order.id, "Order placed");
                // A clear during the call may already have started a new cart.
                if self.inner.store.is_current(ticket) {
                    self.inner.store.clear();
                    if let Err(e) = self.inner.storage.remove(keys::CART_ID) {
                        warn!(error = %e, "Failed to forget completed cart");
                    }
                }
                self.notify(Notice::Success("Order placed".to_string()));
                Ok(CompletionOutcome::Order(order))
            }
            CompleteCartResponse::Cart { cart, error } => {
                warn!(
                    cart_id = %cart.id,
                    reason = error.as_ref().map_or("", |e| e.message.as_str()),
                    "Cart completion refused"
                );
                self.inner.store.apply(ticket, cart.clone());
                let outcome = CompletionOutcome::Rejected { cart, error };
                if let Some(message) = outcome.rejection_message() {
                    self.notify(Notice::Error(message));
                }
                Ok(outcome)
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Explicit ID, else the store's cart, else the persisted ID.
    fn resolve_cart_id(&self, explicit: Option<&CartId>) -> Result<Option<CartId>, SyncError> {
        if let Some(id) = explicit {
            return Ok(Some(id.clone()));
        }
        self.inner.stored_cart_id()
    }

    fn require_cart_id(&self, explicit: Option<&CartId>) -> Result<CartId, SyncError> {
        self.resolve_cart_id(explicit)?
            .ok_or(SyncError::NoActiveCart)
    }

    /// Run one cart-returning call under a fresh ticket.
    async fn mutate(
        &self,
        call: impl Future<Output = Result<Cart, CommerceError>>,
    ) -> Result<Cart, SyncError> {
        let ticket = self.inner.store.begin();
        match call.await {
            Ok(cart) => {
                self.inner.store.apply(ticket, cart.clone());
                Ok(cart)
            }
            Err(e) => Err(self.settle_failure(ticket, e.into())),
        }
    }

    fn settle_failure(&self, ticket: MutationTicket, error: SyncError) -> SyncError {
        warn!(error = %error, "Cart operation failed");
        error.report();
        self.inner.store.fail(ticket, error.clone());
        self.notify(Notice::Error(error.user_message()));
        error
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.inner.notices.send(notice);
    }
}

impl OrchestratorInner {
    fn stored_cart_id(&self) -> Result<Option<CartId>, SyncError> {
        if let Some(id) = self.store.cart_id() {
            return Ok(Some(id));
        }
        Ok(self.storage.get(keys::CART_ID)?.map(CartId::from))
    }

    async fn ensure_cart_flight(self: Arc<Self>) -> Result<Cart, SyncError> {
        let ticket = self.store.begin();
        match self.find_or_create(ticket).await {
            Ok(cart) => {
                self.store.apply(ticket, cart.clone());
                Ok(cart)
            }
            Err(error) => {
                warn!(error = %error, "Failed to ensure cart");
                error.report();
                self.store.fail(ticket, error.clone());
                let _ = self.notices.send(Notice::Error(error.user_message()));
                Err(error)
            }
        }
    }

    async fn find_or_create(&self, ticket: MutationTicket) -> Result<Cart, SyncError> {
        if let Some(id) = self.stored_cart_id()? {
            match self.api.retrieve_cart(&id, &self.settings.query()).await {
                Ok(cart) if cart.completed_at.is_none() => {
                    debug!(cart_id = %cart.id, "Reusing stored cart");
                    return Ok(cart);
                }
                Ok(_) => info!(cart_id = %id, "Stored cart already completed"),
                Err(CommerceError::NotFound(_)) => info!(cart_id = %id, "Stored cart no longer exists"),
                Err(e) => return Err(e.into()),
            }
        }

        let request = CreateCartRequest {
            region_id: self.settings.region_id.clone(),
            sales_channel_id: self.settings.sales_channel_id.clone(),
            email: None,
        };
        let cart = self.api.create_cart(&request).await?;
        self.persist_cart_id(ticket, &cart.id)?;
        add_breadcrumb("cart", "Created cart", Some(&[("cart_id", cart.id.as_str())]));
        info!(cart_id = %cart.id, "Created cart");
        Ok(cart)
    }

    /// Remember `id` unless the cart was cleared while the flight ran.
    ///
    /// Checked again after the write: a clear that lands between the check
    /// and the write would otherwise leave the ID behind.
    fn persist_cart_id(&self, ticket: MutationTicket, id: &CartId) -> Result<(), SyncError> {
        if !self.store.is_current(ticket) {
            debug!(cart_id = %id, "Cart cleared during creation, not persisting");
            return Ok(());
        }
        self.storage.set(keys::CART_ID, id.as_str())?;
        if !self.store.is_current(ticket) {
            self.storage.remove(keys::CART_ID)?;
        }
        Ok(())
    }
}
