use thiserror::Error;

use crate::{ActivityId, InstanceId, SequenceNo};

/// Errors that can occur when interacting with the history store.
#[derive(Debug, Error)]
pub enum HistoryStoreError {
    /// No instance with this id has been created.
    #[error("Instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// An instance with this id already exists.
    #[error("Instance already exists: {0}")]
    InstanceAlreadyExists(InstanceId),

    /// The instance reached a terminal state; its history is closed.
    #[error("Instance {0} is terminal and accepts no further events")]
    InstanceTerminal(InstanceId),

    /// A concurrency conflict occurred when appending events.
    /// The expected sequence number did not match the actual one.
    #[error(
        "Concurrency conflict for instance {instance_id}: expected sequence {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        instance_id: InstanceId,
        expected: SequenceNo,
        actual: SequenceNo,
    },

    /// An outcome was already recorded for this activity.
    #[error("Outcome already recorded for activity {activity_id} of instance {instance_id}")]
    DuplicateOutcome {
        instance_id: InstanceId,
        activity_id: ActivityId,
    },

    /// The batch violates the history invariants.
    #[error("Invalid append for instance {instance_id}: {reason}")]
    InvalidAppend {
        instance_id: InstanceId,
        reason: String,
    },

    /// Persisted history could not be interpreted.
    #[error("Corrupt history for instance {instance_id}: {reason}")]
    Corrupt {
        instance_id: InstanceId,
        reason: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HistoryStoreError {
    /// Returns true for errors that may succeed when the operation is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HistoryStoreError::ConcurrencyConflict { .. } | HistoryStoreError::Database(_)
        )
    }
}

/// Result type for history store operations.
pub type Result<T> = std::result::Result<T, HistoryStoreError>;
