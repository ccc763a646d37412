//! Session and order history commands.
//!
//! # Usage
//!
//! ```bash
//! CW_PASSWORD=... cw login -e asha@example.com
//! cw whoami
//! cw orders --limit 5
//! cw order order_01H...
//! cw logout
//! ```

use cartwheel_core::OrderId;
use cartwheel_storefront::Storefront;

use super::{CommandError, print_json};

const PASSWORD_ENV: &str = "CW_PASSWORD";

/// Sign in.
///
/// # Errors
///
/// Returns an error if no password is available or the login fails.
pub async fn login(
    storefront: &Storefront,
    email: &str,
    password: Option<String>,
) -> Result<(), CommandError> {
    let password = password
        .or_else(|| std::env::var(PASSWORD_ENV).ok())
        .ok_or(CommandError::MissingPassword)?;

    let identity = storefront.login(email, &password).await?;
    match identity.customer {
        Some(customer) => {
            tracing::info!("Signed in as {}", customer.full_name());
            print_json(&customer)
        }
        None => {
            tracing::warn!("Signed in, but the profile could not be loaded");
            Ok(())
        }
    }
}

/// Sign out and forget the cart.
///
/// # Errors
///
/// Returns an error if stored state cannot be removed.
pub fn logout(storefront: &Storefront) -> Result<(), CommandError> {
    storefront.logout()?;
    tracing::info!("Signed out");
    Ok(())
}

/// Show the signed-in customer.
///
/// # Errors
///
/// Returns an error if the profile cannot be printed.
pub fn whoami(storefront: &Storefront) -> Result<(), CommandError> {
    let identity = storefront.session().identity();
    match identity.customer {
        Some(customer) => print_json(&customer),
        None if identity.is_degraded() => {
            tracing::warn!("Signed in, but the profile is unavailable right now");
            Ok(())
        }
        None => {
            tracing::info!("Not signed in");
            Ok(())
        }
    }
}

/// List past orders.
///
/// # Errors
///
/// Returns an error when signed out or the request fails.
pub async fn orders(storefront: &Storefront, limit: u32, offset: u32) -> Result<(), CommandError> {
    let page = storefront.orders(limit, offset).await?;
    print_json(&page)
}

/// Show one order.
///
/// # Errors
///
/// Returns an error if the order cannot be retrieved.
pub async fn order(storefront: &Storefront, id: &str) -> Result<(), CommandError> {
    let view = storefront.order(&OrderId::new(id)).await?;
    print_json(&view)
}
