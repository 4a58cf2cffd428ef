//! Order submission endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::Order;
use history_store::{HistoryStore, InstanceId};
use order_processing::ORCHESTRATION_NAME;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SubmitOrderRequest {
    /// Optional caller-chosen instance id; generated when absent.
    pub instance_id: Option<String>,
    #[serde(flatten)]
    pub order: Order,
}

#[derive(Serialize)]
pub struct OrderAcceptedResponse {
    pub instance_id: InstanceId,
}

/// POST /orders — start a `ProcessOrder` instance for the order.
///
/// Money fields (`total_price`, `shipping_rate`, item `price`) take integer
/// cents or a decimal dollar string (`"600.00"`); `tax_rate` takes integer
/// basis points or a decimal fraction string (`"0.08"`).
///
/// Returns as soon as the instance is created. The order itself is validated
/// by the workflow, so an invalid order is accepted here and fails there.
#[tracing::instrument(skip(state, req))]
pub async fn submit<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<OrderAcceptedResponse>), ApiError> {
    let instance_id = state
        .client
        .start_instance(ORCHESTRATION_NAME, &req.order, req.instance_id.as_deref())
        .await?;

    tracing::info!(%instance_id, order_id = %req.order.order_id, "order accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderAcceptedResponse { instance_id }),
    ))
}
