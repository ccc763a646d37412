//! Type-safe price representation using decimal arithmetic.
//!
//! Amounts arrive from the commerce service already computed (subtotals,
//! taxes, discounts). They are carried as [`Decimal`] so nothing is lost in
//! transit and are only ever formatted here, never recomputed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., rupees, not paise).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Format for display (e.g., "₹1299.00").
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.amount.round_dp(2);
        if rounded.is_sign_negative() && !rounded.is_zero() {
            format!("-{}{:.2}", self.currency_code.symbol(), rounded.abs())
        } else {
            format!("{}{:.2}", self.currency_code.symbol(), rounded.abs())
        }
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes.
///
/// The commerce service reports currency codes in lowercase (`"inr"`);
/// deserialization accepts either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    #[serde(alias = "INR")]
    Inr,
    #[serde(alias = "USD")]
    Usd,
    #[serde(alias = "EUR")]
    Eur,
    #[serde(alias = "GBP")]
    Gbp,
    #[serde(alias = "CAD")]
    Cad,
    #[serde(alias = "AUD")]
    Aud,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Inr => "₹",
            Self::Usd | Self::Cad | Self::Aud => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
        }
    }

    /// Uppercase ISO code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Inr => "INR",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inr" => Ok(Self::Inr),
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "cad" => Ok(Self::Cad),
            "aud" => Ok(Self::Aud),
            _ => Err(format!("unsupported currency code: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_display_rounds_to_two_places() {
        let price = Price::new(Decimal::new(129_950, 2), CurrencyCode::Inr);
        assert_eq!(price.display(), "₹1299.50");

        let price = Price::new(Decimal::new(19_999, 3), CurrencyCode::Usd);
        assert_eq!(price.display(), "$20.00");
    }

    #[test]
    fn test_display_negative() {
        let price = Price::new(Decimal::new(-500, 2), CurrencyCode::Gbp);
        assert_eq!(price.to_string(), "-£5.00");
    }

    #[test]
    fn test_currency_code_parsing() {
        assert_eq!(CurrencyCode::from_str("INR").unwrap(), CurrencyCode::Inr);
        assert_eq!(CurrencyCode::from_str("eur").unwrap(), CurrencyCode::Eur);
        assert!(CurrencyCode::from_str("xyz").is_err());

        let code: CurrencyCode = serde_json::from_str("\"usd\"").unwrap();
        assert_eq!(code, CurrencyCode::Usd);
        let code: CurrencyCode = serde_json::from_str("\"AUD\"").unwrap();
        assert_eq!(code, CurrencyCode::Aud);
    }
}
