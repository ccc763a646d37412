//! Cart and checkout commands.
//!
//! # Usage
//!
//! ```bash
//! cw cart add variant_01H... -q 2
//! cw cart update cali_01H... 3
//! cw promo apply WELCOME10
//! cw address shipping --file home.json
//! cw address billing --saved addr_01H... --silent
//! cw email asha@example.com
//! cw checkout
//! ```

use std::path::Path;

use cartwheel_core::{AddressId, LineItemId, Price};
use cartwheel_storefront::Storefront;
use cartwheel_storefront::cart::{
    AddressRole, AddressUpdateOptions, CompletionOutcome, LineItemInput, LineItemUpdate,
    SavedAddress,
};
use cartwheel_storefront::commerce::Cart;
use cartwheel_storefront::order::map_order;
use serde::Serialize;

use super::{CommandError, drain_notices, print_json};

/// Compact cart rendering.
#[derive(Debug, Serialize)]
struct CartSummary {
    id: String,
    items: Vec<LineSummary>,
    promotions: Vec<String>,
    subtotal: String,
    discount: String,
    shipping: String,
    tax: String,
    total: String,
}

#[derive(Debug, Serialize)]
struct LineSummary {
    id: String,
    title: String,
    quantity: u32,
    total: String,
}

impl From<&Cart> for CartSummary {
    fn from(cart: &Cart) -> Self {
        let totals = cart.totals();
        Self {
            id: cart.id.to_string(),
            items: cart
                .items
                .iter()
                .map(|item| LineSummary {
                    id: item.id.to_string(),
                    title: item.variant_title.as_ref().map_or_else(
                        || item.title.clone(),
                        |variant| format!("{} ({variant})", item.title),
                    ),
                    quantity: item.quantity,
                    total: Price::new(item.total, cart.currency_code).display(),
                })
                .collect(),
            promotions: cart.promotion_codes(),
            subtotal: totals.subtotal.display(),
            discount: totals.discount_total.display(),
            shipping: totals.shipping_total.display(),
            tax: totals.tax_total.display(),
            total: totals.total.display(),
        }
    }
}

fn print_cart(cart: &Cart) -> Result<(), CommandError> {
    print_json(&CartSummary::from(cart))
}

/// Show the current cart, creating one if needed.
///
/// # Errors
///
/// Returns an error if the cart cannot be loaded.
pub async fn show(storefront: &Storefront) -> Result<(), CommandError> {
    let cart = storefront.cart().ensure_cart().await?;
    print_cart(&cart)
}

/// Add a variant to the cart.
///
/// # Errors
///
/// Returns an error if the line cannot be added.
pub async fn add(storefront: &Storefront, variant_id: &str, quantity: u32) -> Result<(), CommandError> {
    let mut notices = storefront.cart().subscribe_notices();
    let result = storefront
        .cart()
        .add_line_item(None, LineItemInput::new(variant_id).with_quantity(quantity))
        .await;
    drain_notices(&mut notices);
    print_cart(&result?)
}

/// Change a line's quantity (0 removes it).
///
/// # Errors
///
/// Returns an error if the line cannot be updated.
pub async fn update(storefront: &Storefront, line_id: &str, quantity: u32) -> Result<(), CommandError> {
    let mut notices = storefront.cart().subscribe_notices();
    let result = storefront
        .cart()
        .update_line_item(None, &LineItemId::new(line_id), LineItemUpdate::quantity(quantity))
        .await;
    drain_notices(&mut notices);
    print_cart(&result?)
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if the line cannot be removed.
pub async fn remove(storefront: &Storefront, line_id: &str) -> Result<(), CommandError> {
    let mut notices = storefront.cart().subscribe_notices();
    let result = storefront
        .cart()
        .delete_line_item(None, &LineItemId::new(line_id))
        .await;
    drain_notices(&mut notices);
    print_cart(&result?)
}

/// Forget the cart on this device.
///
/// # Errors
///
/// Returns an error if the stored cart ID cannot be removed.
pub fn clear(storefront: &Storefront) -> Result<(), CommandError> {
    storefront.cart().clear_cart()?;
    tracing::info!("Cart cleared");
    Ok(())
}

/// Apply a promotion code.
///
/// # Errors
///
/// Returns an error if the code had no effect or the request failed.
pub async fn apply_promo(storefront: &Storefront, code: &str) -> Result<(), CommandError> {
    let mut notices = storefront.cart().subscribe_notices();
    let result = storefront.cart().apply_promotion_code(None, code).await;
    drain_notices(&mut notices);
    print_cart(&result?)
}

/// Remove a promotion code.
///
/// # Errors
///
/// Returns an error if the request failed.
pub async fn remove_promo(storefront: &Storefront, code: &str) -> Result<(), CommandError> {
    let mut notices = storefront.cart().subscribe_notices();
    let result = storefront.cart().remove_promotion_code(None, code).await;
    drain_notices(&mut notices);
    print_cart(&result?)
}

/// Where an address comes from.
#[derive(Debug, Default)]
pub struct AddressSource<'a> {
    /// JSON file holding a saved address.
    pub file: Option<&'a Path>,
    /// ID of an address saved on the signed-in account.
    pub saved: Option<&'a str>,
}

/// Set the shipping or billing address.
///
/// # Errors
///
/// Returns an error if no usable address was given or the request failed.
pub async fn set_address(
    storefront: &Storefront,
    role: AddressRole,
    source: AddressSource<'_>,
    silent: bool,
) -> Result<(), CommandError> {
    let address = load_address(storefront, &source)?;
    let options = AddressUpdateOptions { silent };

    let mut notices = storefront.cart().subscribe_notices();
    let result = match role {
        AddressRole::Shipping => {
            storefront
                .cart()
                .update_cart_shipping_address(None, address.as_ref(), options)
                .await
        }
        AddressRole::Billing => {
            storefront
                .cart()
                .update_cart_billing_address(None, address.as_ref(), options)
                .await
        }
    };
    drain_notices(&mut notices);
    print_cart(&result?)
}

fn load_address(
    storefront: &Storefront,
    source: &AddressSource<'_>,
) -> Result<Option<SavedAddress>, CommandError> {
    if let Some(path) = source.file {
        let raw = std::fs::read_to_string(path).map_err(|source| CommandError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        return Ok(Some(serde_json::from_str(&raw)?));
    }

    if let Some(id) = source.saved {
        let customer = storefront.session().identity().customer;
        return customer
            .and_then(|c| c.address(&AddressId::new(id)).cloned())
            .map(Some)
            .ok_or_else(|| CommandError::UnknownAddress(id.to_string()));
    }

    Ok(None)
}

/// Set the cart's contact email.
///
/// # Errors
///
/// Returns an error if the email is invalid or the request failed.
pub async fn set_email(storefront: &Storefront, email: &str) -> Result<(), CommandError> {
    let cart = storefront.cart().update_cart_email(None, email).await?;
    print_cart(&cart)
}

/// Complete the cart.
///
/// A refusal is printed as the cart that needs fixing, not treated as a
/// command failure.
///
/// # Errors
///
/// Returns an error if the completion request itself failed.
pub async fn checkout(storefront: &Storefront) -> Result<(), CommandError> {
    let mut notices = storefront.cart().subscribe_notices();
    let result = storefront.cart().complete_cart(None, None).await;
    drain_notices(&mut notices);

    match result? {
        CompletionOutcome::Order(order) => print_json(&map_order(&order)),
        CompletionOutcome::Rejected { cart, .. } => print_cart(&cart),
    }
}
