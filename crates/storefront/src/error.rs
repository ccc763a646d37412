//! Unified error handling with Sentry integration.
//!
//! Provides the engine-level `SyncError` that every orchestrator and session
//! operation returns, plus the Sentry helpers used to tag breadcrumbs and the
//! current user.

use thiserror::Error;

use cartwheel_core::EmailError;

use crate::cart::address::AddressError;
use crate::commerce::CommerceError;
use crate::storage::StorageError;

/// Engine-level error type.
///
/// `Clone` because the store keeps the last error next to the cart and
/// single-flighted operations hand the same result to every waiter.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Commerce service call failed.
    #[error("Commerce error: {0}")]
    Commerce(#[from] CommerceError),

    /// An address operation was called without an address.
    #[error("No address provided")]
    MissingAddress,

    /// The address could not be mapped to the service's shape.
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    /// The service answered a promotion call but the code did not take effect.
    #[error("Coupon '{code}' is invalid or not eligible for this cart")]
    InvalidOrIneligibleCoupon {
        /// The code as submitted.
        code: String,
    },

    /// The cart email failed validation.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// A quantity outside the accepted range was supplied.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// A cart operation needs a cart ID and none is known.
    #[error("No active cart")]
    NoActiveCart,

    /// A customer operation was called without a session token.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Client-side storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Whether the service rejected the session token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Commerce(CommerceError::Unauthorized))
    }

    /// Text safe to show to the shopper in a toast.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Commerce(CommerceError::Service { payload, .. })
                if !payload.message.is_empty() =>
            {
                payload.message.clone()
            }
            Self::Commerce(CommerceError::Unauthorized) | Self::NotAuthenticated => {
                "Please sign in again.".to_string()
            }
            Self::Commerce(CommerceError::NotFound(_)) => {
                "We couldn't find what you were looking for.".to_string()
            }
            Self::Commerce(CommerceError::RateLimited(_)) => {
                "Too many requests. Please try again in a moment.".to_string()
            }
            Self::Commerce(_) | Self::Storage(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::MissingAddress => "Please select an address.".to_string(),
            Self::Address(err) => format!("Please complete your address: {err}."),
            Self::InvalidOrIneligibleCoupon { code } => {
                format!("Coupon \"{code}\" is invalid or not applicable.")
            }
            Self::InvalidEmail(_) => "Please enter a valid email address.".to_string(),
            Self::InvalidQuantity(_) => "Please choose a valid quantity.".to_string(),
            Self::NoActiveCart => "Your cart is empty.".to_string(),
        }
    }

    /// Send unexpected failures to Sentry.
    ///
    /// Business outcomes (bad coupon, missing address) are not reported.
    pub fn report(&self) {
        if matches!(
            self,
            Self::Commerce(
                CommerceError::Http(_) | CommerceError::Parse(_) | CommerceError::Service { .. }
            ) | Self::Storage(_)
        ) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Sync operation failed"
            );
        }
    }
}

/// Set the Sentry user context for error tracking.
///
/// Call this after hydrating the customer profile to associate errors with
/// the user.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// operations leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added line item", Some(&[("variant_id", "variant_1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::ErrorPayload;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::InvalidOrIneligibleCoupon {
            code: "GARBAGE".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Coupon 'GARBAGE' is invalid or not eligible for this cart"
        );

        let err = SyncError::from(CommerceError::NotFound("cart cart_1".to_string()));
        assert_eq!(err.to_string(), "Commerce error: Not found: cart cart_1");
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(SyncError::Commerce(CommerceError::Unauthorized).is_unauthorized());
        assert!(!SyncError::NotAuthenticated.is_unauthorized());
        assert!(!SyncError::Commerce(CommerceError::RateLimited(1)).is_unauthorized());
    }

    #[test]
    fn test_user_message_prefers_service_payload() {
        let err = SyncError::Commerce(CommerceError::Service {
            status: 400,
            payload: ErrorPayload {
                kind: Some("invalid_data".to_string()),
                code: None,
                message: "Variant is out of stock".to_string(),
            },
        });
        assert_eq!(err.user_message(), "Variant is out of stock");

        let err = SyncError::Commerce(CommerceError::Http("connection reset".to_string()));
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
    }
}
