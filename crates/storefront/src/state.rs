//! Engine state shared by every UI surface.

use std::sync::Arc;

use cartwheel_core::OrderId;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cart::{
    CartCoordinator, CartOrchestrator, CartSettings, DiffPromotionCheck, PromotionCheck,
};
use crate::commerce::{CommerceApi, CommerceClient, CommerceError};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::order::{OrderView, map_order};
use crate::search::RecentSearches;
use crate::session::{ProfileCoordinator, SessionGuard, SessionIdentity};
use crate::storage::ClientStorage;
use crate::wishlist::Wishlist;

/// A page of the signed-in customer's orders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

/// The synchronization engine.
///
/// Cheaply cloneable via `Arc`. Built once at startup; the request
/// coordinators it creates are shared by everything it hands out.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: SyncConfig,
    api: Arc<dyn CommerceApi>,
    cart: CartOrchestrator,
    session: SessionGuard,
    wishlist: Wishlist,
    searches: RecentSearches,
}

impl Storefront {
    /// Create the engine against the configured commerce service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or stored state
    /// cannot be read.
    pub fn new(config: SyncConfig, storage: Arc<dyn ClientStorage>) -> Result<Self, SyncError> {
        let api = Arc::new(CommerceClient::new(&config)?);
        Self::with_api(config, api, storage)
    }

    /// Create the engine with a custom `CommerceApi`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if stored state cannot be read.
    pub fn with_api(
        config: SyncConfig,
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn ClientStorage>,
    ) -> Result<Self, SyncError> {
        Self::with_parts(config, api, storage, DiffPromotionCheck)
    }

    /// Create the engine with a custom `CommerceApi` and promotion check.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if stored state cannot be read.
    pub fn with_parts(
        config: SyncConfig,
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn ClientStorage>,
        promotion_check: impl PromotionCheck + 'static,
    ) -> Result<Self, SyncError> {
        let session = SessionGuard::new(
            Arc::clone(&api),
            Arc::clone(&storage),
            Arc::new(ProfileCoordinator::new()),
            config.identity_retry_delay,
        )?;
        let cart = CartOrchestrator::with_promotion_check(
            Arc::clone(&api),
            Arc::clone(&storage),
            Arc::new(CartCoordinator::new()),
            CartSettings::from_config(&config),
            promotion_check,
        );
        let wishlist = Wishlist::new(Arc::clone(&api), Arc::clone(&storage), session.clone());
        let searches = RecentSearches::new(storage);

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                cart,
                session,
                wishlist,
                searches,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Cart operations and the cart store.
    #[must_use]
    pub fn cart(&self) -> &CartOrchestrator {
        &self.inner.cart
    }

    #[must_use]
    pub fn session(&self) -> &SessionGuard {
        &self.inner.session
    }

    #[must_use]
    pub fn wishlist(&self) -> &Wishlist {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn searches(&self) -> &RecentSearches {
        &self.inner.searches
    }

    /// Restore the session at startup.
    ///
    /// A failed profile fetch leaves the session degraded rather than
    /// failing startup.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> SessionIdentity {
        match self.inner.session.hydrate().await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Session restore failed");
                self.inner.session.identity()
            }
        }
    }

    /// Sign in and move the guest wishlist into the account.
    ///
    /// # Errors
    ///
    /// Returns the login or hydration error. A failed wishlist merge is only
    /// logged.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionIdentity, SyncError> {
        self.inner.session.login(email, password).await?;
        if let Err(e) = self.inner.wishlist.merge_guest_items().await {
            warn!(error = %e, "Failed to merge guest wishlist");
        }
        Ok(self.inner.session.identity())
    }

    /// Sign out: forget the token, profile, and cart.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if stored state cannot be removed.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<(), SyncError> {
        self.inner.session.logout()?;
        self.inner.cart.clear_cart()?;
        info!("Logged out");
        Ok(())
    }

    /// Look up one order, as the signed-in customer if there is one.
    ///
    /// # Errors
    ///
    /// Returns the service error; a 401 also ends the session.
    #[instrument(skip(self))]
    pub async fn order(&self, id: &OrderId) -> Result<OrderView, SyncError> {
        let token = self.inner.session.token()?;
        let query = CartSettings::from_config(&self.inner.config).query();
        let order = self
            .inner
            .api
            .retrieve_order(id, token.as_deref(), &query)
            .await
            .map_err(|e| self.commerce_failure(e))?;
        Ok(map_order(&order))
    }

    /// List the signed-in customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a session, otherwise
    /// the service error; a 401 also ends the session.
    #[instrument(skip(self))]
    pub async fn orders(&self, limit: u32, offset: u32) -> Result<OrderPage, SyncError> {
        let token = self
            .inner
            .session
            .token()?
            .ok_or(SyncError::NotAuthenticated)?;
        let list = self
            .inner
            .api
            .list_orders(&token, limit, offset)
            .await
            .map_err(|e| self.commerce_failure(e))?;

        Ok(OrderPage {
            orders: list.orders.iter().map(map_order).collect(),
            count: list.count,
            offset: list.offset,
            limit: list.limit,
        })
    }

    fn commerce_failure(&self, error: CommerceError) -> SyncError {
        if error == CommerceError::Unauthorized {
            if let Err(e) = self.inner.session.expire() {
                warn!(error = %e, "Failed to clear rejected session");
            }
        }
        let error = SyncError::from(error);
        error.report();
        error
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwheel_core::ProductId;
    use secrecy::SecretString;
    use url::Url;

    use super::*;
    use crate::cart::LineItemInput;
    use crate::commerce::fake::{FakeCommerce, customer};
    use crate::storage::{MemoryStorage, keys};

    fn storefront(fake: FakeCommerce) -> (Storefront, Arc<FakeCommerce>, Arc<MemoryStorage>) {
        let config = SyncConfig::new(
            Url::parse("http://localhost:9000").unwrap(),
            SecretString::from("pk_test".to_string()),
        );
        let fake = Arc::new(fake);
        let storage = Arc::new(MemoryStorage::new());
        let storefront = Storefront::with_api(config, fake.clone(), storage.clone()).unwrap();
        (storefront, fake, storage)
    }

    #[tokio::test]
    async fn test_login_merges_guest_wishlist() {
        let (storefront, fake, _) =
            storefront(FakeCommerce::new().with_customer(customer("cus_1")));
        storefront.wishlist().add(&ProductId::new("prod_1")).await.unwrap();

        let identity = storefront
            .login("asha@example.com", "correct-horse")
            .await
            .unwrap();

        assert!(identity.is_authenticated());
        assert_eq!(
            identity.customer.unwrap().wishlist(),
            vec![ProductId::new("prod_1")]
        );
        assert_eq!(fake.calls("update_customer_metadata"), 1);
    }

    #[tokio::test]
    async fn test_bad_password_leaves_session_empty() {
        let (storefront, _, _) = storefront(FakeCommerce::new().with_customer(customer("cus_1")));
        let err = storefront
            .login("asha@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!storefront.session().identity().token_present);
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_cart() {
        let (storefront, _, storage) =
            storefront(FakeCommerce::new().with_customer(customer("cus_1")));
        storefront
            .login("asha@example.com", "correct-horse")
            .await
            .unwrap();
        storefront
            .cart()
            .add_line_item(None, LineItemInput::new("variant_a"))
            .await
            .unwrap();

        storefront.logout().unwrap();

        assert!(storefront.cart().store().cart().is_none());
        assert!(storage.get(keys::CART_ID).unwrap().is_none());
        assert!(storage.get(keys::AUTH_TOKEN).unwrap().is_none());
        assert!(storefront.session().identity().customer.is_none());
    }

    #[tokio::test]
    async fn test_orders_require_session() {
        let (storefront, fake, _) = storefront(FakeCommerce::new());
        let err = storefront.orders(10, 0).await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthenticated));
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_token_on_orders_ends_session() {
        let (storefront, fake, _) =
            storefront(FakeCommerce::new().with_customer(customer("cus_1")));
        storefront
            .login("asha@example.com", "correct-horse")
            .await
            .unwrap();
        fake.fail_next(CommerceError::Unauthorized);

        let err = storefront.orders(10, 0).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!storefront.session().identity().token_present);
    }

    #[tokio::test]
    async fn test_restore_without_token() {
        let (storefront, fake, _) = storefront(FakeCommerce::new());
        let identity = storefront.restore().await;
        assert!(!identity.token_present);
        assert_eq!(fake.total_calls(), 0);
    }
}
