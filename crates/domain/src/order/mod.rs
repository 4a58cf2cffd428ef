//! The order payload and its validation rules.

mod pricing;
mod value_objects;

pub use pricing::{
    DISCOUNT_RATE, DISCOUNT_THRESHOLD, PriceBreakdown, calculate_discount, calculate_shipping,
    calculate_taxes,
};
pub use value_objects::{Money, OrderItem, Rate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrderValidationError;

/// Unix timestamp of 0001-01-01T00:00:00Z, the zero date some clients send
/// in place of a missing one.
const ZERO_DATE_TIMESTAMP: i64 = -62_135_596_800;

/// A customer order as submitted for processing.
///
/// This is plain data: the engine passes it to activities as JSON and never
/// looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    #[serde(default)]
    pub tax_rate: Rate,
    /// Shipping weight; the unit matches `shipping_rate`.
    #[serde(default)]
    pub weight: f64,
    /// Shipping cost per unit of weight.
    #[serde(default)]
    pub shipping_rate: Money,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_processed: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        customer_name: impl Into<String>,
        items: Vec<OrderItem>,
        total_price: Money,
        tax_rate: Rate,
        date_created: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_name: customer_name.into(),
            items,
            total_price,
            tax_rate,
            weight: 0.0,
            shipping_rate: Money::zero(),
            date_created: Some(date_created),
            date_processed: None,
        }
    }

    /// Sets the shipping weight and per-unit rate.
    pub fn with_shipping(mut self, weight: f64, shipping_rate: Money) -> Self {
        self.weight = weight;
        self.shipping_rate = shipping_rate;
        self
    }

    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.date_processed = Some(at);
    }

    /// Checks the order can be processed.
    ///
    /// Pure and deterministic; reports the first problem found.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.order_id.trim().is_empty() {
            return Err(OrderValidationError::MissingOrderId);
        }
        if self.customer_name.trim().is_empty() {
            return Err(OrderValidationError::MissingCustomerName);
        }
        if self.items.is_empty() {
            return Err(OrderValidationError::NoItems);
        }
        if !self.total_price.is_positive() {
            return Err(OrderValidationError::NonPositiveTotal {
                total: self.total_price,
            });
        }
        match self.date_created {
            Some(date) if date.timestamp() > ZERO_DATE_TIMESTAMP => {}
            _ => return Err(OrderValidationError::MissingCreationDate),
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Sum of the item line totals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
