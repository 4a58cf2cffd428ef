//! Order processing on the durable orchestration engine.
//!
//! This crate provides:
//! - The `ProcessOrder` workflow program
//! - The eight order activities
//! - Service traits for the systems the activities call, with in-memory
//!   implementations
//!
//! [`build_scheduler`] wires all of it onto a history store.

pub mod activities;
pub mod error;
pub mod services;
pub mod workflow;

pub use activities::{ALL_ACTIVITIES, PaymentRequest, register_activities};
pub use error::ServiceError;
pub use services::{
    InMemoryInventoryService, InMemoryNotificationService, InMemoryOrderRecordService,
    InMemoryPaymentService, InMemoryServices, InMemoryShippingService, InventoryService,
    NotificationService, OrderRecord, OrderRecordService, OrderServices, PaymentService,
    ShippingService,
};
pub use workflow::{ORCHESTRATION_NAME, SUCCESS_OUTPUT, process_order};

use history_store::HistoryStore;
use orchestration::{
    ActivityRegistry, OrchestrationRegistry, RetryPolicy, Scheduler, SchedulerOptions,
};

/// Registries holding `ProcessOrder` and its activities.
pub fn registries(services: &OrderServices) -> (OrchestrationRegistry, ActivityRegistry) {
    let mut orchestrations = OrchestrationRegistry::new();
    orchestrations.register_fn(ORCHESTRATION_NAME, process_order);

    let mut activities = ActivityRegistry::new();
    register_activities(&mut activities, services);

    (orchestrations, activities)
}

/// Builds a scheduler that runs `ProcessOrder` against `store`.
pub fn build_scheduler<S>(
    store: S,
    services: &OrderServices,
    options: SchedulerOptions,
    retry: RetryPolicy,
) -> Scheduler<S>
where
    S: HistoryStore + Clone + 'static,
{
    let (orchestrations, activities) = registries(services);
    Scheduler::new(store, orchestrations, activities, options, retry)
}
