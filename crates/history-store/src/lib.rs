//! Append-only history store for durable orchestrations.
//!
//! Every orchestration instance owns a totally ordered log of
//! [`HistoryEvent`]s. The log is the only source of truth for the instance:
//! its status, output and the outcome of every activity it scheduled are all
//! derived by folding the log (see [`WorkflowInstance`]). Events are never
//! rewritten or deleted.
//!
//! Two backends are provided:
//! - [`InMemoryHistoryStore`] for tests and single-process deployments
//! - [`PostgresHistoryStore`] for durable storage

pub mod error;
pub mod event;
pub mod instance;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::InstanceId;
pub use error::{HistoryStoreError, Result};
pub use event::{
    ActivityCompletedData, ActivityFailedData, ActivityId, ActivityScheduledData, FailureDetails,
    FailureKind, HistoryEvent, HistoryRecord, InstanceCreatedData, OrchestratorCompletedData,
    OrchestratorFailedData, SequenceNo, TerminationData,
};
pub use instance::{InstanceStatus, WorkflowInstance};
pub use memory::InMemoryHistoryStore;
pub use postgres::PostgresHistoryStore;
pub use store::{AppendGuard, AppendOptions, HistoryStore, HistoryStoreExt};
