//! Money and the major/minor currency unit boundary.
//!
//! Every conversion between rupees (major units, as the storefront and the
//! carrier see them) and paise (minor units, as the payment gateway sees
//! them) goes through [`to_minor_units`] and [`to_major_units`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minor units per major unit.
const MINOR_PER_MAJOR: i64 = 100;

/// Errors produced at the currency conversion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    /// The amount does not fit in a signed 64-bit count of minor units.
    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),
}

/// Converts a major-unit amount to minor units, rounding half-up to the
/// nearest minor unit.
pub fn to_minor_units(major: Decimal) -> Result<i64, CurrencyError> {
    major
        .checked_mul(Decimal::from(MINOR_PER_MAJOR))
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_i64())
        .ok_or(CurrencyError::OutOfRange(major))
}

/// Converts a minor-unit amount to an exact two-decimal major-unit amount.
pub fn to_major_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// ISO 4217 currency of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Inr,
}

impl Currency {
    /// Returns the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
        }
    }

    /// Parses an ISO 4217 code, case-insensitively.
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "INR" => Some(Currency::Inr),
            _ => None,
        }
    }

    /// Returns the display symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Inr => "₹",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Money amount held in minor units (paise) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    paise: i64,
}

impl Money {
    /// Creates an amount from minor units.
    pub fn from_paise(paise: i64) -> Self {
        Self { paise }
    }

    /// Creates an amount from a major-unit decimal, rounding half-up.
    pub fn from_major(major: Decimal) -> Result<Self, CurrencyError> {
        to_minor_units(major).map(Self::from_paise)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { paise: 0 }
    }

    /// Returns the amount in minor units.
    pub fn paise(&self) -> i64 {
        self.paise
    }

    /// Returns the amount in major units with exactly two decimal places.
    pub fn major(&self) -> Decimal {
        to_major_units(self.paise)
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.paise > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.paise == 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            paise: self.paise * i64::from(quantity),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.paise < 0 { "-" } else { "" };
        let abs = self.paise.unsigned_abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            paise: self.paise + rhs.paise,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            paise: self.paise - rhs.paise,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.paise += rhs.paise;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
