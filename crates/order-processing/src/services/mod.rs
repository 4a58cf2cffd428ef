//! External service traits and in-memory implementations for the order
//! activities.
//!
//! Every in-memory service is idempotent per order id: a repeated call for
//! the same order returns the first result instead of acting twice, since
//! the dispatcher may invoke an activity more than once.

pub mod inventory;
pub mod notification;
pub mod payment;
pub mod records;
pub mod shipping;

use std::sync::Arc;

pub use inventory::{InMemoryInventoryService, InventoryService, InventoryUpdate};
pub use notification::{InMemoryNotificationService, NotificationResult, NotificationService};
pub use payment::{InMemoryPaymentService, PaymentResult, PaymentService};
pub use records::{InMemoryOrderRecordService, OrderRecord, OrderRecordService, RecordResult};
pub use shipping::{InMemoryShippingService, ShipmentResult, ShippingService};

use crate::error::ServiceError;

/// The services the order activities talk to.
#[derive(Clone)]
pub struct OrderServices {
    pub inventory: Arc<dyn InventoryService>,
    pub payment: Arc<dyn PaymentService>,
    pub shipping: Arc<dyn ShippingService>,
    pub notification: Arc<dyn NotificationService>,
    pub records: Arc<dyn OrderRecordService>,
}

/// In-memory services with handles kept for inspection in tests and the
/// demo server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServices {
    pub inventory: InMemoryInventoryService,
    pub payment: InMemoryPaymentService,
    pub shipping: InMemoryShippingService,
    pub notification: InMemoryNotificationService,
    pub records: InMemoryOrderRecordService,
}

impl InMemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> OrderServices {
        OrderServices {
            inventory: Arc::new(self.inventory.clone()),
            payment: Arc::new(self.payment.clone()),
            shipping: Arc::new(self.shipping.clone()),
            notification: Arc::new(self.notification.clone()),
            records: Arc::new(self.records.clone()),
        }
    }
}

/// Failure switches shared by the in-memory services.
#[derive(Debug, Default)]
pub(crate) struct Faults {
    reject: Option<String>,
    unavailable: u32,
}

impl Faults {
    pub(crate) fn reject_with(&mut self, reason: Option<String>) {
        self.reject = reason;
    }

    pub(crate) fn unavailable_for(&mut self, calls: u32) {
        self.unavailable = calls;
    }

    /// Consumes one unavailable call, or reports the configured rejection.
    pub(crate) fn check(
        &mut self,
        service: &'static str,
        reject: impl FnOnce(String) -> ServiceError,
    ) -> Result<(), ServiceError> {
        if self.unavailable > 0 {
            self.unavailable -= 1;
            return Err(ServiceError::Unavailable { service });
        }
        match &self.reject {
            Some(reason) => Err(reject(reason.clone())),
            None => Ok(()),
        }
    }
}
