//! Order record storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use domain::{Money, Order, OrderValidationError, PriceBreakdown};
use serde::{Deserialize, Serialize};

use super::Faults;
use crate::error::ServiceError;

/// What gets stored for a processed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order: Order,
    pub prices: PriceBreakdown,
    pub amount_due: Money,
}

impl OrderRecord {
    /// Fails when the amount due does not fit in [`Money`].
    pub fn new(order: Order, prices: PriceBreakdown) -> Result<Self, OrderValidationError> {
        let amount_due = prices.amount_due(&order)?;
        Ok(Self {
            order,
            prices,
            amount_due,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResult {
    pub record_id: String,
}

/// Trait for persisting order records.
#[async_trait]
pub trait OrderRecordService: Send + Sync {
    /// Stores the record, stamping the processing date.
    async fn create(&self, record: OrderRecord) -> Result<RecordResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryRecordState {
    records: HashMap<String, (RecordResult, OrderRecord)>,
    next_id: u32,
    calls: usize,
    faults: Faults,
}

/// In-memory order records for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRecordService {
    state: Arc<RwLock<InMemoryRecordState>>,
}

impl InMemoryOrderRecordService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        let reason = fail.then(|| "Database is read-only".to_string());
        self.state.write().unwrap().faults.reject_with(reason);
    }

    pub fn set_unavailable_for(&self, calls: u32) {
        self.state.write().unwrap().faults.unavailable_for(calls);
    }

    pub fn record_count(&self) -> usize {
        self.state.read().unwrap().records.len()
    }

    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }

    pub fn record_for(&self, order_id: &str) -> Option<OrderRecord> {
        self.state
            .read()
            .unwrap()
            .records
            .get(order_id)
            .map(|(_, record)| record.clone())
    }
}

#[async_trait]
impl OrderRecordService for InMemoryOrderRecordService {
    async fn create(&self, mut record: OrderRecord) -> Result<RecordResult, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        state.faults.check("order records", ServiceError::Records)?;

        let order_id = record.order.order_id.clone();
        if let Some((existing, _)) = state.records.get(&order_id) {
            return Ok(existing.clone());
        }

        record.order.mark_processed(Utc::now());
        state.next_id += 1;
        let result = RecordResult {
            record_id: format!("REC-{:04}", state.next_id),
        };
        state.records.insert(order_id.clone(), (result.clone(), record));

        tracing::info!(order_id = %order_id, record_id = %result.record_id, "order record created");
        Ok(result)
    }
}
