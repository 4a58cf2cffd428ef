//! Inventory service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::OrderItem;
use serde::{Deserialize, Serialize};

use super::Faults;
use crate::error::ServiceError;

/// Result of a successful inventory update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    /// The update ID assigned by the inventory service.
    pub update_id: String,
    /// Units removed from stock.
    pub units: u32,
}

/// Trait for inventory management operations.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Removes the ordered items from stock.
    async fn update(
        &self,
        order_id: &str,
        items: &[OrderItem],
    ) -> Result<InventoryUpdate, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    updates: HashMap<String, InventoryUpdate>,
    units_by_item: HashMap<String, u32>,
    next_id: u32,
    calls: usize,
    faults: Faults,
}

/// In-memory inventory service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to reject every update.
    pub fn set_fail_on_update(&self, fail: bool) {
        let reason = fail.then(|| "Insufficient stock".to_string());
        self.state.write().unwrap().faults.reject_with(reason);
    }

    pub fn set_unavailable_for(&self, calls: u32) {
        self.state.write().unwrap().faults.unavailable_for(calls);
    }

    /// Returns the number of orders applied to stock.
    pub fn update_count(&self) -> usize {
        self.state.read().unwrap().updates.len()
    }

    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }

    /// Returns how many units of `item` have left stock.
    pub fn units_shipped(&self, item: &str) -> u32 {
        self.state
            .read()
            .unwrap()
            .units_by_item
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn update(
        &self,
        order_id: &str,
        items: &[OrderItem],
    ) -> Result<InventoryUpdate, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        state.faults.check("inventory service", ServiceError::Inventory)?;

        if let Some(existing) = state.updates.get(order_id) {
            return Ok(existing.clone());
        }

        let mut units = 0;
        for item in items {
            *state.units_by_item.entry(item.name.clone()).or_default() += item.quantity;
            units += item.quantity;
        }

        state.next_id += 1;
        let update = InventoryUpdate {
            update_id: format!("INV-{:04}", state.next_id),
            units,
        };
        state.updates.insert(order_id.to_string(), update.clone());

        tracing::info!(order_id, units, update_id = %update.update_id, "inventory updated");
        Ok(update)
    }
}
