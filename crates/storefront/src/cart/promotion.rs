//! Promotion acceptance checks.
//!
//! The commerce service answers a promotion call with the updated cart and
//! no verdict, so whether a code took effect has to be inferred from what
//! changed. The inference lives behind [`PromotionCheck`] so a service that
//! grows an explicit signal can replace it without touching the orchestrator.

use rust_decimal::Decimal;

use crate::commerce::Cart;

/// The promotion-relevant parts of a cart at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionSnapshot {
    /// Applied promotion codes.
    pub codes: Vec<String>,
    /// Total discount on the cart.
    pub discount_total: Decimal,
}

impl PromotionSnapshot {
    /// Capture a snapshot of `cart`.
    #[must_use]
    pub fn of(cart: &Cart) -> Self {
        Self {
            codes: cart.promotion_codes(),
            discount_total: cart.discount_total,
        }
    }

    /// Whether `code` is already applied (case-insensitive).
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c.eq_ignore_ascii_case(code))
    }
}

/// Decides whether a submitted promotion code was accepted.
pub trait PromotionCheck: Send + Sync {
    /// Compare the cart before and after submitting `code`.
    fn accepted(&self, code: &str, before: &PromotionSnapshot, after: &PromotionSnapshot) -> bool;
}

/// Accepts a code when the cart gained a promotion or a bigger discount.
///
/// Best effort: a promotion with no price effect (free gift) that also
/// fails to show up in the code list reads as rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPromotionCheck;

impl PromotionCheck for DiffPromotionCheck {
    fn accepted(&self, _code: &str, before: &PromotionSnapshot, after: &PromotionSnapshot) -> bool {
        after.codes.len() > before.codes.len() || after.discount_total > before.discount_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(codes: &[&str], discount: i64) -> PromotionSnapshot {
        PromotionSnapshot {
            codes: codes.iter().map(|c| (*c).to_string()).collect(),
            discount_total: Decimal::new(discount, 0),
        }
    }

    #[test]
    fn test_new_code_is_accepted() {
        let check = DiffPromotionCheck;
        assert!(check.accepted("VALID10", &snapshot(&[], 0), &snapshot(&["VALID10"], 100)));
    }

    #[test]
    fn test_discount_increase_alone_is_accepted() {
        let check = DiffPromotionCheck;
        assert!(check.accepted("STACK", &snapshot(&["A"], 50), &snapshot(&["A"], 80)));
    }

    #[test]
    fn test_unchanged_cart_is_rejected() {
        let check = DiffPromotionCheck;
        assert!(!check.accepted("GARBAGE", &snapshot(&["A"], 50), &snapshot(&["A"], 50)));
    }

    #[test]
    fn test_discount_decrease_is_rejected() {
        let check = DiffPromotionCheck;
        assert!(!check.accepted("SWAP", &snapshot(&["A"], 80), &snapshot(&["B"], 50)));
    }

    #[test]
    fn test_same_length_codes_without_discount_change_are_rejected() {
        let check = DiffPromotionCheck;
        assert!(!check.accepted("B", &snapshot(&["A"], 50), &snapshot(&["B"], 50)));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let snap = snapshot(&["Valid10"], 0);
        assert!(snap.contains("VALID10"));
        assert!(!snap.contains("VALID20"));
    }
}
