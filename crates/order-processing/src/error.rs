//! Errors returned by the external services.

use orchestration::ActivityError;
use thiserror::Error;

/// Errors that can occur when calling an external service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Inventory service rejected the update.
    #[error("Inventory service error: {0}")]
    Inventory(String),

    /// Payment was declined.
    #[error("Payment service error: {0}")]
    Payment(String),

    /// Shipping service rejected the shipment.
    #[error("Shipping service error: {0}")]
    Shipping(String),

    /// Notification could not be sent.
    #[error("Notification service error: {0}")]
    Notification(String),

    /// Order record could not be written.
    #[error("Order records error: {0}")]
    Records(String),

    /// The service could not be reached; worth retrying.
    #[error("{service} is unavailable")]
    Unavailable { service: &'static str },
}

impl From<ServiceError> for ActivityError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Unavailable { .. } => ActivityError::transient(error.to_string()),
            other => ActivityError::failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_transient() {
        let error: ActivityError = ServiceError::Unavailable { service: "payment" }.into();
        assert!(error.is_transient());
        assert_eq!(error.to_string(), "payment is unavailable");
    }

    #[test]
    fn test_rejection_is_permanent() {
        let error: ActivityError = ServiceError::Payment("Payment declined".into()).into();
        assert_eq!(
            error,
            ActivityError::failed("Payment service error: Payment declined")
        );
    }
}
