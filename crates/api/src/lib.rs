//! HTTP API server for the order-processing orchestration engine.
//!
//! Provides REST endpoints for submitting orders and inspecting or
//! terminating their workflow instances, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use history_store::HistoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use orchestration::Scheduler;
use order_processing::InMemoryServices;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: HistoryStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/orders", post(routes::orders::submit::<S>))
        .route("/instances/{id}", get(routes::instances::get::<S>))
        .route("/instances/{id}/history", get(routes::instances::history::<S>))
        .route(
            "/instances/{id}/terminate",
            post(routes::instances::terminate::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state and the scheduler that runs its instances.
///
/// Activities call in-memory services. The caller decides how the returned
/// scheduler is driven (`run` in the server, `run_until_idle` in tests).
pub fn create_default_state<S: HistoryStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S>>, Scheduler<S>) {
    let services = InMemoryServices::new();
    let scheduler = order_processing::build_scheduler(
        store,
        &services.services(),
        config.scheduler_options(),
        config.retry_policy(),
    );

    let state = Arc::new(AppState {
        client: scheduler.client(),
        services,
    });

    (state, scheduler)
}
