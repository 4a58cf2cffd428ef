//! HTTP route handlers.

pub mod health;
pub mod instances;
pub mod metrics;
pub mod orders;

use history_store::{HistoryStore, InstanceId};
use order_processing::InMemoryServices;
use orchestration::OrchestrationClient;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: HistoryStore> {
    pub client: OrchestrationClient<S>,
    pub services: InMemoryServices,
}

pub(crate) fn parse_instance_id(id: &str) -> Result<InstanceId, ApiError> {
    InstanceId::parse(id).map_err(|e| ApiError::BadRequest(e.to_string()))
}
