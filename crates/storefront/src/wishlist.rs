//! Saved products.
//!
//! Signed-in shoppers keep their wishlist in the customer's
//! `metadata.wishlist` on the service; every edit is written there and the
//! profile is then re-fetched through the session guard. Guests keep a
//! local list, which is merged into the account on login.

use std::sync::Arc;

use cartwheel_core::ProductId;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::commerce::{CommerceApi, CommerceError, Metadata};
use crate::error::{SyncError, add_breadcrumb};
use crate::session::SessionGuard;
use crate::storage::{ClientStorage, keys, load_json, store_json};

const METADATA_WISHLIST: &str = "wishlist";

/// Wishlist for the current shopper, signed in or not.
#[derive(Clone)]
pub struct Wishlist {
    inner: Arc<WishlistInner>,
}

struct WishlistInner {
    api: Arc<dyn CommerceApi>,
    storage: Arc<dyn ClientStorage>,
    session: SessionGuard,
}

impl Wishlist {
    #[must_use]
    pub fn new(
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn ClientStorage>,
        session: SessionGuard,
    ) -> Self {
        Self {
            inner: Arc::new(WishlistInner {
                api,
                storage,
                session,
            }),
        }
    }

    /// Current product IDs, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the guest list cannot be read.
    pub fn items(&self) -> Result<Vec<ProductId>, SyncError> {
        let identity = self.inner.session.identity();
        match identity.customer {
            Some(customer) if identity.token_present => Ok(customer.wishlist()),
            _ => self.guest_items(),
        }
    }

    /// Whether `product_id` is saved.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the guest list cannot be read.
    pub fn contains(&self, product_id: &ProductId) -> Result<bool, SyncError> {
        Ok(self.items()?.contains(product_id))
    }

    /// Save a product. Saving one twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the storage or service error from writing the list.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: &ProductId) -> Result<Vec<ProductId>, SyncError> {
        let mut items = self.items()?;
        if items.contains(product_id) {
            return Ok(items);
        }
        items.push(product_id.clone());
        add_breadcrumb(
            "wishlist",
            "Saved product",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.save(items).await
    }

    /// Remove a product.
    ///
    /// # Errors
    ///
    /// Returns the storage or service error from writing the list.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<Vec<ProductId>, SyncError> {
        let mut items = self.items()?;
        let before = items.len();
        items.retain(|p| p != product_id);
        if items.len() == before {
            return Ok(items);
        }
        add_breadcrumb(
            "wishlist",
            "Removed product",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.save(items).await
    }

    /// Add the product if missing, remove it otherwise. Returns whether it is
    /// now saved.
    ///
    /// # Errors
    ///
    /// Returns the storage or service error from writing the list.
    pub async fn toggle(&self, product_id: &ProductId) -> Result<bool, SyncError> {
        if self.contains(product_id)? {
            self.remove(product_id).await?;
            Ok(false)
        } else {
            self.add(product_id).await?;
            Ok(true)
        }
    }

    /// Move the guest list into the signed-in account.
    ///
    /// Does nothing while signed out or when the guest list is empty.
    ///
    /// # Errors
    ///
    /// Returns the storage or service error; the guest list is kept on
    /// failure.
    #[instrument(skip(self))]
    pub async fn merge_guest_items(&self) -> Result<Vec<ProductId>, SyncError> {
        if !self.inner.session.identity().is_authenticated() {
            return self.guest_items();
        }

        let guest = self.guest_items()?;
        let mut items = self.items()?;
        if guest.is_empty() {
            return Ok(items);
        }

        let before = items.len();
        for product_id in guest {
            if !items.contains(&product_id) {
                items.push(product_id);
            }
        }
        debug!(added = items.len() - before, "Merging guest wishlist");

        let items = if items.len() == before {
            items
        } else {
            self.save(items).await?
        };
        self.inner.storage.remove(keys::WISHLIST)?;
        Ok(items)
    }

    fn guest_items(&self) -> Result<Vec<ProductId>, SyncError> {
        Ok(load_json(self.inner.storage.as_ref(), keys::WISHLIST)?.unwrap_or_default())
    }

    async fn save(&self, items: Vec<ProductId>) -> Result<Vec<ProductId>, SyncError> {
        let session = &self.inner.session;
        if !session.identity().is_authenticated() {
            store_json(self.inner.storage.as_ref(), keys::WISHLIST, &items)?;
            return Ok(items);
        }

        let token = session.token()?.ok_or(SyncError::NotAuthenticated)?;
        let mut metadata = Metadata::new();
        metadata.insert(
            METADATA_WISHLIST.to_string(),
            Value::Array(
                items
                    .iter()
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            ),
        );

        match self
            .inner
            .api
            .update_customer_metadata(&token, &metadata)
            .await
        {
            Ok(_) => {}
            Err(CommerceError::Unauthorized) => {
                session.expire()?;
                return Err(CommerceError::Unauthorized.into());
            }
            Err(e) => {
                let error = SyncError::from(e);
                error.report();
                return Err(error);
            }
        }

        match session.refresh().await {
            Ok(customer) => Ok(customer.wishlist()),
            Err(e) => {
                warn!(error = %e, "Wishlist saved but profile refresh failed");
                Ok(items)
            }
        }
    }
}
