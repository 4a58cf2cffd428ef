//! Engine error types.

use std::time::Duration;

use common::InvalidInstanceId;
use history_store::{ActivityId, FailureKind, HistoryStoreError, InstanceId};
use thiserror::Error;

/// Errors seen by workflow programs.
///
/// Programs propagate these with `?`. [`WorkflowError::Suspended`] is not a
/// failure: it unwinds the program at the first activity call that has no
/// outcome yet, and the next pass resumes from the top.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The program is waiting for activity outcomes.
    #[error("orchestration suspended awaiting activity outcomes")]
    Suspended,

    /// An awaited activity failed.
    #[error("Activity '{name}' ({activity_id}) failed: {message}")]
    ActivityFailed {
        activity_id: ActivityId,
        name: String,
        message: String,
    },

    /// One or more members of an activity group failed.
    #[error("{failed} of {total} grouped activities failed; first failure in '{name}': {message}")]
    GroupFailed {
        failed: usize,
        total: usize,
        name: String,
        message: String,
    },

    /// The program rejected its input.
    #[error("{0}")]
    Validation(String),

    /// The program's calls do not match the recorded history.
    #[error("Nondeterministic orchestration: {0}")]
    NonDeterminism(String),

    /// A termination was requested while the program was waiting.
    #[error("Orchestration terminated: {0}")]
    Terminated(String),

    /// Input or activity result did not have the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other program failure.
    #[error("{0}")]
    Application(String),
}

impl WorkflowError {
    /// How the instance failure is classified, or None for errors that do
    /// not fail the instance.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            WorkflowError::Suspended | WorkflowError::Terminated(_) => None,
            WorkflowError::Validation(_) => Some(FailureKind::Validation),
            WorkflowError::ActivityFailed { .. } | WorkflowError::GroupFailed { .. } => {
                Some(FailureKind::Activity)
            }
            WorkflowError::NonDeterminism(_) => Some(FailureKind::NonDeterminism),
            WorkflowError::Serialization(_) | WorkflowError::Application(_) => {
                Some(FailureKind::Application)
            }
        }
    }
}

/// Result type for workflow programs.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Errors returned by activity implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// Permanent failure; recorded as the activity's outcome.
    #[error("{0}")]
    Failed(String),

    /// Temporary failure; the dispatcher retries the activity.
    #[error("{0}")]
    Transient(String),
}

impl ActivityError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActivityError::Failed(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ActivityError::Transient(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ActivityError::Transient(_))
    }
}

/// Errors returned by the engine to its host.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// History store error.
    #[error("History store error: {0}")]
    HistoryStore(#[from] HistoryStoreError),

    /// No orchestration is registered under this name.
    #[error("Unknown orchestration: {0}")]
    UnknownOrchestration(String),

    /// Instance not found.
    #[error("Instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Caller supplied an unusable instance id.
    #[error(transparent)]
    InvalidInstanceId(#[from] InvalidInstanceId),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// History could not be interpreted.
    #[error("Corrupt history for instance {instance_id}: {reason}")]
    CorruptHistory {
        instance_id: InstanceId,
        reason: String,
    },

    /// The instance did not finish in time.
    #[error("Instance {instance_id} did not complete within {waited:?}")]
    Timeout {
        instance_id: InstanceId,
        waited: Duration,
    },
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, OrchestrationError>;
