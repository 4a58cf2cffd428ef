//! Domain error types.

use thiserror::Error;

/// Reasons an order is rejected before any activity runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderValidationError {
    /// Order ID is empty or blank.
    #[error("order id is required")]
    MissingOrderId,

    /// Customer name is empty or blank.
    #[error("customer name is required")]
    MissingCustomerName,

    /// Order has no items.
    #[error("order has no items")]
    NoItems,

    /// Total price is zero or negative.
    #[error("total price must be greater than zero (got {total})")]
    NonPositiveTotal { total: crate::Money },

    /// Creation date was not supplied, or is the zero date.
    #[error("creation date is required")]
    MissingCreationDate,

    /// Total plus taxes and shipping minus discount does not fit in `Money`.
    #[error("amount due is out of range")]
    AmountDueOutOfRange,
}
