//! Shipping service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Faults;
use crate::error::ServiceError;

/// Result of a successful shipment creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentResult {
    /// The tracking number assigned by the shipping service.
    pub tracking_number: String,
}

/// Trait for shipping operations.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Ships an order to its customer.
    async fn fulfill(
        &self,
        order_id: &str,
        customer_name: &str,
        weight: f64,
    ) -> Result<ShipmentResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryShippingState {
    shipments: HashMap<String, ShipmentResult>,
    next_id: u32,
    calls: usize,
    faults: Faults,
}

/// In-memory shipping service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl InMemoryShippingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to reject every shipment.
    pub fn set_fail_on_fulfill(&self, fail: bool) {
        let reason = fail.then(|| "No carrier available".to_string());
        self.state.write().unwrap().faults.reject_with(reason);
    }

    pub fn set_unavailable_for(&self, calls: u32) {
        self.state.write().unwrap().faults.unavailable_for(calls);
    }

    /// Returns the number of shipments created.
    pub fn shipment_count(&self) -> usize {
        self.state.read().unwrap().shipments.len()
    }

    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }

    pub fn shipment_for(&self, order_id: &str) -> Option<ShipmentResult> {
        self.state.read().unwrap().shipments.get(order_id).cloned()
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn fulfill(
        &self,
        order_id: &str,
        customer_name: &str,
        weight: f64,
    ) -> Result<ShipmentResult, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        state.faults.check("shipping service", ServiceError::Shipping)?;

        if let Some(existing) = state.shipments.get(order_id) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let shipment = ShipmentResult {
            tracking_number: format!("TRACK-{:04}", state.next_id),
        };
        state.shipments.insert(order_id.to_string(), shipment.clone());

        tracing::info!(order_id, customer_name, weight, tracking_number = %shipment.tracking_number, "shipment created");
        Ok(shipment)
    }
}
