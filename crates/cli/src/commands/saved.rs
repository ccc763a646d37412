//! Wishlist and recent search commands.

use cartwheel_core::ProductId;
use cartwheel_storefront::Storefront;

use super::{CommandError, print_json};

/// Show the wishlist.
///
/// # Errors
///
/// Returns an error if the list cannot be read.
pub fn wishlist(storefront: &Storefront) -> Result<(), CommandError> {
    print_json(&storefront.wishlist().items()?)
}

/// Save a product.
///
/// # Errors
///
/// Returns an error if the list cannot be written.
pub async fn wishlist_add(storefront: &Storefront, product_id: &str) -> Result<(), CommandError> {
    let items = storefront
        .wishlist()
        .add(&ProductId::new(product_id))
        .await?;
    print_json(&items)
}

/// Unsave a product.
///
/// # Errors
///
/// Returns an error if the list cannot be written.
pub async fn wishlist_remove(storefront: &Storefront, product_id: &str) -> Result<(), CommandError> {
    let items = storefront
        .wishlist()
        .remove(&ProductId::new(product_id))
        .await?;
    print_json(&items)
}

/// Remember a search term.
///
/// # Errors
///
/// Returns an error if storage cannot be written.
pub fn record_search(storefront: &Storefront, term: &str) -> Result<(), CommandError> {
    print_json(&storefront.searches().record(term)?)
}

/// Show recent search terms.
///
/// # Errors
///
/// Returns an error if storage cannot be read.
pub fn recent_searches(storefront: &Storefront) -> Result<(), CommandError> {
    print_json(&storefront.searches().list()?)
}

/// Forget recent search terms.
///
/// # Errors
///
/// Returns an error if storage cannot be written.
pub fn clear_searches(storefront: &Storefront) -> Result<(), CommandError> {
    storefront.searches().clear()?;
    Ok(())
}
