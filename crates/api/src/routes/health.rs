//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use history_store::{HistoryStore, InstanceId};
use serde::Serialize;

const PROBE_INSTANCE: &str = "health-probe";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health — returns `ok` while the history store answers reads.
pub async fn check<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<super::AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let reachable = match InstanceId::parse(PROBE_INSTANCE) {
        Ok(probe) => state
            .client
            .get_instance(&probe)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match reachable {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(error) => {
            tracing::warn!(%error, "history store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}
