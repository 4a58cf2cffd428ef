//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};

use super::Faults;
use crate::error::ServiceError;

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// The payment ID assigned by the payment service.
    pub payment_id: String,
    pub amount: Money,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges a customer for an order.
    async fn charge(
        &self,
        order_id: &str,
        customer_name: &str,
        amount: Money,
    ) -> Result<PaymentResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, PaymentResult>,
    next_id: u32,
    calls: usize,
    faults: Faults,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to decline every charge.
    pub fn set_fail_on_charge(&self, fail: bool) {
        let reason = fail.then(|| "Payment declined".to_string());
        self.state.write().unwrap().faults.reject_with(reason);
    }

    /// Makes the next `calls` charges fail as unavailable.
    pub fn set_unavailable_for(&self, calls: u32) {
        self.state.write().unwrap().faults.unavailable_for(calls);
    }

    /// Returns the number of distinct payments taken.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns how many times `charge` was called.
    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }

    pub fn payment_for(&self, order_id: &str) -> Option<PaymentResult> {
        self.state.read().unwrap().payments.get(order_id).cloned()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        order_id: &str,
        customer_name: &str,
        amount: Money,
    ) -> Result<PaymentResult, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        state.faults.check("payment service", ServiceError::Payment)?;

        if let Some(existing) = state.payments.get(order_id) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let result = PaymentResult {
            payment_id: format!("PAY-{:04}", state.next_id),
            amount,
        };
        state.payments.insert(order_id.to_string(), result.clone());

        tracing::info!(order_id, customer_name, %amount, payment_id = %result.payment_id, "payment charged");
        Ok(result)
    }
}
