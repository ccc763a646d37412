//! Saved-address to cart-address mapping.
//!
//! Account pages store addresses in a loose shape (`name`, `street`,
//! `pincode`, ...). The commerce service wants a normalized one. Shipping and
//! billing go through the same [`map_address`]; the role only affects how
//! the result is labelled in logs and errors.

use cartwheel_core::AddressId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::commerce::Metadata;

/// Metadata key holding the saved address's ID.
pub const METADATA_ADDRESS_ID: &str = "address_id";
/// Metadata key holding the saved address's logical type.
pub const METADATA_ADDRESS_TYPE: &str = "address_type";

/// Which cart address is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressRole {
    Shipping,
    Billing,
}

impl std::fmt::Display for AddressRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shipping => write!(f, "shipping"),
            Self::Billing => write!(f, "billing"),
        }
    }
}

/// Logical type of a saved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    Home,
    #[serde(alias = "work")]
    Office,
    #[serde(other)]
    Other,
}

impl AddressType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Office => "office",
            Self::Other => "other",
        }
    }
}

/// An address as saved on the customer's account.
///
/// Field names vary between the forms that write these records, so the
/// common spellings are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedAddress {
    #[serde(default)]
    pub id: Option<AddressId>,
    /// Combined name, used when first/last are not given separately.
    #[serde(default, alias = "full_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default, alias = "street", alias = "address")]
    pub address_1: Option<String>,
    #[serde(default)]
    pub address_2: Option<String>,
    #[serde(default)]
    pub landmark: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "state")]
    pub province: Option<String>,
    #[serde(default, alias = "pincode", alias = "zip")]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "type")]
    pub address_type: Option<AddressType>,
}

/// A saved address could not be mapped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// A field the service requires is missing or blank.
    #[error("{role} address is missing {field}")]
    MissingField {
        role: AddressRole,
        field: &'static str,
    },
}

/// Address in the shape the commerce service accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPayload {
    pub first_name: String,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub address_1: String,
    pub address_2: Option<String>,
    pub city: String,
    pub province: Option<String>,
    pub postal_code: String,
    pub country_code: String,
    pub phone: Option<String>,
    pub metadata: Metadata,
}

/// Map a saved address into the service's address shape.
///
/// - A combined `name` is split at the first whitespace when first/last are
///   absent.
/// - `landmark` becomes `address_2` as `"Near {landmark}"` only when no
///   explicit `address_2` is present.
/// - The saved address ID and type are carried in `metadata`.
///
/// # Errors
///
/// Returns `AddressError::MissingField` if first name, street, city, postal
/// code, or country cannot be determined.
pub fn map_address(
    address: &SavedAddress,
    role: AddressRole,
    default_country: &str,
) -> Result<AddressPayload, AddressError> {
    let (first_name, last_name) = split_name(address);

    let address_2 = clean(address.address_2.as_deref()).or_else(|| {
        clean(address.landmark.as_deref()).map(|landmark| format!("Near {landmark}"))
    });

    let country_code = clean(address.country_code.as_deref())
        .or_else(|| clean(Some(default_country)))
        .map(|c| c.to_ascii_lowercase());

    let mut metadata = Metadata::new();
    if let Some(id) = &address.id {
        metadata.insert(
            METADATA_ADDRESS_ID.to_string(),
            Value::String(id.to_string()),
        );
    }
    metadata.insert(
        METADATA_ADDRESS_TYPE.to_string(),
        Value::String(address.address_type.unwrap_or_default().as_str().to_string()),
    );

    Ok(AddressPayload {
        first_name: required(first_name, role, "first_name")?,
        last_name,
        company: clean(address.company.as_deref()),
        address_1: required(clean(address.address_1.as_deref()), role, "address_1")?,
        address_2,
        city: required(clean(address.city.as_deref()), role, "city")?,
        province: clean(address.province.as_deref()),
        postal_code: required(clean(address.postal_code.as_deref()), role, "postal_code")?,
        country_code: required(country_code, role, "country_code")?,
        phone: clean(address.phone.as_deref()),
        metadata,
    })
}

fn split_name(address: &SavedAddress) -> (Option<String>, Option<String>) {
    let first = clean(address.first_name.as_deref());
    let last = clean(address.last_name.as_deref());
    if first.is_some() || last.is_some() {
        return (first, last);
    }

    let Some(full) = clean(address.name.as_deref()) else {
        return (None, None);
    };
    match full.split_once(char::is_whitespace) {
        Some((first, rest)) => (Some(first.to_string()), clean(Some(rest))),
        None => (Some(full), None),
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(
    value: Option<String>,
    role: AddressRole,
    field: &'static str,
) -> Result<String, AddressError> {
    value.ok_or(AddressError::MissingField { role, field })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn saved(value: serde_json::Value) -> SavedAddress {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_maps_loose_ui_fields() {
        let address = saved(json!({
            "id": "addr_1",
            "name": "Asha Rao Menon",
            "street": "12 MG Road",
            "landmark": "City Mall",
            "city": "Bengaluru",
            "state": "Karnataka",
            "pincode": "560001",
            "phone": "9999999999",
            "type": "office"
        }));

        let payload = map_address(&address, AddressRole::Shipping, "in").unwrap();

        assert_eq!(payload.first_name, "Asha");
        assert_eq!(payload.last_name.as_deref(), Some("Rao Menon"));
        assert_eq!(payload.address_1, "12 MG Road");
        assert_eq!(payload.address_2.as_deref(), Some("Near City Mall"));
        assert_eq!(payload.province.as_deref(), Some("Karnataka"));
        assert_eq!(payload.postal_code, "560001");
        assert_eq!(payload.country_code, "in");
        assert_eq!(payload.metadata.get("address_id"), Some(&json!("addr_1")));
        assert_eq!(payload.metadata.get("address_type"), Some(&json!("office")));
    }

    #[test]
    fn test_explicit_address_2_wins_over_landmark() {
        let address = saved(json!({
            "first_name": "Ravi",
            "address_1": "4 Park St",
            "address_2": "Flat 3B",
            "landmark": "Clock Tower",
            "city": "Kolkata",
            "zip": "700016",
            "country_code": "IN"
        }));

        let payload = map_address(&address, AddressRole::Billing, "us").unwrap();
        assert_eq!(payload.address_2.as_deref(), Some("Flat 3B"));
        assert_eq!(payload.country_code, "in");
        assert_eq!(payload.metadata.get("address_type"), Some(&json!("home")));
        assert!(payload.metadata.get("address_id").is_none());
    }

    #[test]
    fn test_single_word_name() {
        let address = saved(json!({
            "full_name": "Madonna",
            "address": "1 Main St",
            "city": "Pune",
            "postal_code": "411001"
        }));
        let payload = map_address(&address, AddressRole::Shipping, "in").unwrap();
        assert_eq!(payload.first_name, "Madonna");
        assert!(payload.last_name.is_none());
    }

    #[test]
    fn test_missing_required_field() {
        let address = saved(json!({
            "name": "Asha Rao",
            "street": "12 MG Road",
            "pincode": "560001"
        }));
        let err = map_address(&address, AddressRole::Billing, "in").unwrap_err();
        assert_eq!(
            err,
            AddressError::MissingField {
                role: AddressRole::Billing,
                field: "city"
            }
        );
        assert_eq!(err.to_string(), "billing address is missing city");
    }

    #[test]
    fn test_blank_fields_count_as_missing() {
        let address = saved(json!({
            "name": "   ",
            "street": "12 MG Road",
            "city": "Bengaluru",
            "pincode": "560001"
        }));
        assert!(matches!(
            map_address(&address, AddressRole::Shipping, "in"),
            Err(AddressError::MissingField { field: "first_name", .. })
        ));
    }

    #[test]
    fn test_roles_produce_identical_payloads() {
        let address = saved(json!({
            "name": "Asha Rao",
            "street": "12 MG Road",
            "city": "Bengaluru",
            "pincode": "560001"
        }));
        assert_eq!(
            map_address(&address, AddressRole::Shipping, "in").unwrap(),
            map_address(&address, AddressRole::Billing, "in").unwrap()
        );
    }
}
