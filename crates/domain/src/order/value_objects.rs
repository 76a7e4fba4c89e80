//! Value objects for the order domain.

use common::Money;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable customer identifier derived from normalized contact details.
///
/// The same email and phone always produce the same id, so a returning
/// shopper is recognised by the payment gateway without logging in. The
/// digest is truncated; it is an identity key, not a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Derives the identifier from an email and phone number.
    pub fn derive(email: &str, phone: &str) -> Self {
        let email = normalize_email(email);
        let phone = normalize_phone(phone);

        let mut hasher = Sha256::new();
        hasher.update(email.as_bytes());
        hasher.update(b"|");
        hasher.update(phone.as_bytes());
        let digest = hasher.finalize();

        Self(format!("cust_{}", hex::encode(&digest[..12])))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keeps digits only and drops a leading country code, so `+91 98765-43210`
/// and `9876543210` normalize to the same value.
fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

/// Six digit Indian postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Pincode(String);

impl Pincode {
    /// Parses a pincode: exactly six ASCII digits, the first non-zero.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let well_formed = value.len() == 6
            && value.bytes().all(|b| b.is_ascii_digit())
            && !value.starts_with('0');
        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(ValidationError::InvalidPincode(value.to_string()))
        }
    }

    /// Returns the pincode as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Pincode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl std::fmt::Display for Pincode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Postal address used for shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: Pincode,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

impl PostalAddress {
    /// Returns the street lines joined for a carrier label.
    pub fn street(&self) -> String {
        match self.line2.as_deref().map(str::trim) {
            Some(line2) if !line2.is_empty() => format!("{}, {}", self.line1.trim(), line2),
            _ => self.line1.trim().to_string(),
        }
    }
}

/// Customer contact details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

impl CustomerDetails {
    /// Checks that name, email, and phone are present and plausible.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "email" });
        }
        if self.phone.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "phone" });
        }

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(ValidationError::InvalidEmail(email.to_string())),
        }

        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        if !(10..=15).contains(&digits) {
            return Err(ValidationError::InvalidPhone(self.phone.clone()));
        }

        Ok(())
    }

    /// Returns the stable identifier for this customer.
    pub fn customer_id(&self) -> CustomerId {
        CustomerId::derive(&self.email, &self.phone)
    }
}

/// How the shopper settles the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Paid online through the gateway.
    #[default]
    Prepaid,
    /// Collected by the carrier on delivery.
    Cod,
}

impl PaymentMethod {
    /// Returns the storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Prepaid => "prepaid",
            PaymentMethod::Cod => "cod",
        }
    }

    /// Parses a storage name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "prepaid" => Some(PaymentMethod::Prepaid),
            "cod" => Some(PaymentMethod::Cod),
            _ => None,
        }
    }
}

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Human-readable product name.
    pub name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns quantity * unit_price.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
