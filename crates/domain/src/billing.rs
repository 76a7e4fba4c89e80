//! Deterministic billing computation.
//!
//! Discount is a step function of the subtotal, tax is a flat rate on the
//! discounted subtotal, and shipping is a flat fee waived once the
//! discounted subtotal reaches the free-shipping threshold. Every output is
//! rounded half-up to two decimal places.

use common::{Currency, Money};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::order::OrderItem;

/// A discount rate that applies once the subtotal reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTier {
    /// Inclusive lower bound of the subtotal, in major units.
    pub threshold: Decimal,
    /// Fraction of the subtotal taken off (0.15 = 15%).
    pub rate: Decimal,
}

/// Rates and thresholds used by [`BillingCalculator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPolicy {
    /// Discount tiers; the highest threshold not above the subtotal wins.
    pub discount_tiers: Vec<DiscountTier>,
    /// Flat tax rate applied to the discounted subtotal.
    pub tax_rate: Decimal,
    /// Shipping fee in major units.
    pub shipping_fee: Decimal,
    /// Discounted subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Currency of all amounts.
    pub currency: Currency,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            discount_tiers: vec![
                DiscountTier {
                    threshold: Decimal::new(3000, 0),
                    rate: Decimal::new(15, 2),
                },
                DiscountTier {
                    threshold: Decimal::new(2000, 0),
                    rate: Decimal::new(10, 2),
                },
                DiscountTier {
                    threshold: Decimal::new(1000, 0),
                    rate: Decimal::new(5, 2),
                },
            ],
            tax_rate: Decimal::new(18, 2),
            shipping_fee: Decimal::new(150, 0),
            free_shipping_threshold: Decimal::new(1000, 0),
            currency: Currency::Inr,
        }
    }
}

impl BillingPolicy {
    /// Returns the discount rate for a subtotal.
    pub fn discount_rate(&self, subtotal: Decimal) -> Decimal {
        self.discount_tiers
            .iter()
            .filter(|tier| subtotal >= tier.threshold)
            .max_by_key(|tier| tier.threshold)
            .map(|tier| tier.rate)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Billing breakdown of an order, fixed at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingBreakdown {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
    pub currency: Currency,
}

impl BillingBreakdown {
    /// Returns the subtotal after discount (the taxable amount).
    pub fn discounted_subtotal(&self) -> Money {
        self.subtotal - self.discount
    }
}

/// Pure billing calculator. Holds no state beyond its policy.
#[derive(Debug, Clone, Default)]
pub struct BillingCalculator {
    policy: BillingPolicy,
}

impl BillingCalculator {
    /// Creates a calculator with the given policy.
    pub fn new(policy: BillingPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in use.
    pub fn policy(&self) -> &BillingPolicy {
        &self.policy
    }

    /// Computes the billing breakdown for a cart.
    pub fn compute(&self, items: &[OrderItem]) -> Result<BillingBreakdown, BillingError> {
        if items.is_empty() {
            return Err(BillingError::NoItems);
        }

        let mut subtotal = Decimal::ZERO;
        for item in items {
            if item.quantity == 0 {
                return Err(BillingError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(BillingError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price_paise: item.unit_price.paise(),
                });
            }
            let line = item
                .unit_price
                .major()
                .checked_mul(Decimal::from(item.quantity))
                .ok_or(common::CurrencyError::OutOfRange(item.unit_price.major()))?;
            subtotal = subtotal
                .checked_add(line)
                .ok_or(common::CurrencyError::OutOfRange(line))?;
        }

        let policy = &self.policy;
        let discount = round_half_up(subtotal * policy.discount_rate(subtotal));
        let discounted = subtotal - discount;
        let tax = round_half_up(discounted * policy.tax_rate);
        let shipping = if discounted >= policy.free_shipping_threshold {
            Decimal::ZERO
        } else {
            round_half_up(policy.shipping_fee)
        };
        let total = discounted + tax + shipping;

        Ok(BillingBreakdown {
            subtotal: Money::from_major(subtotal)?,
            discount: Money::from_major(discount)?,
            tax: Money::from_major(tax)?,
            shipping: Money::from_major(shipping)?,
            total: Money::from_major(total)?,
            currency: policy.currency,
        })
    }
}

fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
