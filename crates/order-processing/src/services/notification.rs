//! Customer notification service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Faults;
use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub notification_id: String,
}

/// Trait for notifying customers.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Tells the customer their order was received.
    async fn order_received(
        &self,
        order_id: &str,
        customer_name: &str,
    ) -> Result<NotificationResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: HashMap<String, (NotificationResult, String)>,
    next_id: u32,
    calls: usize,
    faults: Faults,
}

/// In-memory notification service that keeps sent messages.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        let reason = fail.then(|| "Mailbox unavailable".to_string());
        self.state.write().unwrap().faults.reject_with(reason);
    }

    pub fn set_unavailable_for(&self, calls: u32) {
        self.state.write().unwrap().faults.unavailable_for(calls);
    }

    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }

    /// Returns the message sent for an order.
    pub fn message_for(&self, order_id: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .sent
            .get(order_id)
            .map(|(_, message)| message.clone())
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn order_received(
        &self,
        order_id: &str,
        customer_name: &str,
    ) -> Result<NotificationResult, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        state
            .faults
            .check("notification service", ServiceError::Notification)?;

        if let Some((existing, _)) = state.sent.get(order_id) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let result = NotificationResult {
            notification_id: format!("MSG-{:04}", state.next_id),
        };
        let message = format!("Hi {customer_name}, we have received your order {order_id}.");
        state
            .sent
            .insert(order_id.to_string(), (result.clone(), message));

        tracing::info!(order_id, notification_id = %result.notification_id, "customer notified");
        Ok(result)
    }
}
