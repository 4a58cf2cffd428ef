//! Pricing rules applied by the calculation activities.

use serde::{Deserialize, Serialize};

use super::Order;
use super::value_objects::{Money, Rate};
use crate::error::OrderValidationError;

/// Orders at or above this total get [`DISCOUNT_RATE`] off.
pub const DISCOUNT_THRESHOLD: Money = Money::from_cents(50_000);

pub const DISCOUNT_RATE: Rate = Rate::from_percent(10);

/// Taxes owed: total price times tax rate.
pub fn calculate_taxes(order: &Order) -> Money {
    order.total_price.apply_rate(order.tax_rate)
}

/// Shipping cost: weight times per-unit shipping rate.
pub fn calculate_shipping(order: &Order) -> Money {
    order.shipping_rate.scale(order.weight)
}

/// Discount: 10% of the total for orders of $500.00 or more, else zero.
pub fn calculate_discount(order: &Order) -> Money {
    if order.total_price >= DISCOUNT_THRESHOLD {
        order.total_price.apply_rate(DISCOUNT_RATE)
    } else {
        Money::zero()
    }
}

/// The three calculation results for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub taxes: Money,
    pub shipping: Money,
    pub discount: Money,
}

impl PriceBreakdown {
    pub fn for_order(order: &Order) -> Self {
        Self {
            taxes: calculate_taxes(order),
            shipping: calculate_shipping(order),
            discount: calculate_discount(order),
        }
    }

    /// Amount charged to the customer: total + taxes + shipping - discount.
    ///
    /// Summed in i128 so only the final amount has to fit.
    pub fn amount_due(&self, order: &Order) -> Result<Money, OrderValidationError> {
        let due = i128::from(order.total_price.cents())
            + i128::from(self.taxes.cents())
            + i128::from(self.shipping.cents())
            - i128::from(self.discount.cents());

        i64::try_from(due)
            .map(Money::from_cents)
            .map_err(|_| OrderValidationError::AmountDueOutOfRange)
    }
}
