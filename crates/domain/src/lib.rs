//! Domain layer for order processing.
//!
//! This crate provides:
//! - The `Order` payload carried as workflow input
//! - Order validation, the workflow's first deterministic step
//! - Pricing rules for taxes, shipping and discounts

pub mod error;
pub mod order;

pub use error::OrderValidationError;
pub use order::{
    DISCOUNT_RATE, DISCOUNT_THRESHOLD, Money, Order, OrderItem, PriceBreakdown, Rate,
    calculate_discount, calculate_shipping, calculate_taxes,
};
