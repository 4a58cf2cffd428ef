//! Instance status, history and termination endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use history_store::{
    FailureDetails, HistoryEvent, HistoryRecord, HistoryStore, InstanceId, InstanceStatus,
    SequenceNo, WorkflowInstance,
};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_instance_id};
use crate::error::ApiError;

const DEFAULT_TERMINATION_REASON: &str = "Terminated by request";

#[derive(Serialize)]
pub struct InstanceResponse {
    pub instance_id: InstanceId,
    pub orchestration: String,
    pub status: InstanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<WorkflowInstance> for InstanceResponse {
    fn from(instance: WorkflowInstance) -> Self {
        Self {
            instance_id: instance.instance_id,
            orchestration: instance.orchestration,
            status: instance.status,
            output: instance.output,
            failure: instance.failure,
            termination_reason: instance.termination_reason,
            created_at: instance.created_at,
            completed_at: instance.completed_at,
        }
    }
}

#[derive(Serialize)]
pub struct HistoryEntry {
    pub sequence_no: SequenceNo,
    pub kind: String,
    pub payload: HistoryEvent,
    pub timestamp: DateTime<Utc>,
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        Self {
            sequence_no: record.sequence_no,
            kind: record.kind,
            payload: record.payload,
            timestamp: record.timestamp,
        }
    }
}

#[derive(Deserialize)]
pub struct TerminateRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct TerminateResponse {
    pub instance_id: InstanceId,
    pub reason: String,
}

/// GET /instances/:id — current status of an instance.
#[tracing::instrument(skip(state))]
pub async fn get<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<InstanceResponse>, ApiError> {
    let instance_id = parse_instance_id(&id)?;
    let instance = state
        .client
        .get_instance(&instance_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Instance {instance_id} not found")))?;

    Ok(Json(instance.into()))
}

/// GET /instances/:id/history — the instance's ordered history.
#[tracing::instrument(skip(state))]
pub async fn history<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let instance_id = parse_instance_id(&id)?;
    let records = state.client.get_history(&instance_id).await?;

    Ok(Json(records.into_iter().map(HistoryEntry::from).collect()))
}

/// POST /instances/:id/terminate — request termination of a running instance.
///
/// A missing or blank reason is recorded as a default one.
#[tracing::instrument(skip(state, req))]
pub async fn terminate<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<TerminateRequest>,
) -> Result<(StatusCode, Json<TerminateResponse>), ApiError> {
    let instance_id = parse_instance_id(&id)?;
    let reason = req
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TERMINATION_REASON.to_string());

    state.client.terminate(&instance_id, &reason).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TerminateResponse {
            instance_id,
            reason,
        }),
    ))
}
