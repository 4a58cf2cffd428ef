//! Instance state derived from history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    FailureDetails, HistoryEvent, HistoryRecord, HistoryStoreError, InstanceId, Result, SequenceNo,
};

/// Lifecycle state of an orchestration instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Created, not yet interpreted.
    Pending,
    /// The program has run at least once and has not finished.
    Running,
    /// The program returned an output.
    Completed,
    /// The program failed.
    Failed,
    /// The instance was stopped by request.
    Terminated,
}

impl InstanceStatus {
    /// Returns true if no further events may be appended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Completed | InstanceStatus::Failed | InstanceStatus::Terminated
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "Pending",
            InstanceStatus::Running => "Running",
            InstanceStatus::Completed => "Completed",
            InstanceStatus::Failed => "Failed",
            InstanceStatus::Terminated => "Terminated",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current view of an orchestration instance.
///
/// Never stored on its own: it is rebuilt by folding the instance's history,
/// so it can never disagree with the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: InstanceId,
    pub orchestration: String,
    pub input: serde_json::Value,
    pub status: InstanceStatus,
    pub output: Option<serde_json::Value>,
    pub failure: Option<FailureDetails>,
    /// Reason given with a termination request, once one was recorded.
    pub termination_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Sequence number of the last folded event.
    pub last_sequence: SequenceNo,
}

impl WorkflowInstance {
    /// Rebuilds the instance from its ordered history.
    ///
    /// Returns `None` for an empty history. The first record must be
    /// `InstanceCreated`.
    pub fn from_history(records: &[HistoryRecord]) -> Result<Option<Self>> {
        let Some((first, rest)) = records.split_first() else {
            return Ok(None);
        };

        let HistoryEvent::InstanceCreated(created) = &first.payload else {
            return Err(HistoryStoreError::Corrupt {
                instance_id: first.instance_id.clone(),
                reason: format!("history starts with {} instead of InstanceCreated", first.kind),
            });
        };

        let mut instance = Self {
            instance_id: first.instance_id.clone(),
            orchestration: created.orchestration.clone(),
            input: created.input.clone(),
            status: InstanceStatus::Pending,
            output: None,
            failure: None,
            termination_reason: None,
            created_at: first.timestamp,
            completed_at: None,
            last_sequence: first.sequence_no,
        };

        for record in rest {
            instance.apply(record);
        }

        Ok(Some(instance))
    }

    /// Folds one record into the instance.
    pub fn apply(&mut self, record: &HistoryRecord) {
        self.last_sequence = record.sequence_no;

        match &record.payload {
            HistoryEvent::OrchestratorStarted => {
                if self.status == InstanceStatus::Pending {
                    self.status = InstanceStatus::Running;
                }
            }
            HistoryEvent::TerminationRequested(data) => {
                self.termination_reason = Some(data.reason.clone());
            }
            HistoryEvent::OrchestratorCompleted(data) => {
                self.status = InstanceStatus::Completed;
                self.output = Some(data.output.clone());
                self.completed_at = Some(record.timestamp);
            }
            HistoryEvent::OrchestratorFailed(data) => {
                self.status = InstanceStatus::Failed;
                self.failure = Some(data.error.clone());
                self.completed_at = Some(record.timestamp);
            }
            HistoryEvent::OrchestratorTerminated(data) => {
                self.status = InstanceStatus::Terminated;
                self.termination_reason = Some(data.reason.clone());
                self.completed_at = Some(record.timestamp);
            }
            HistoryEvent::InstanceCreated(_)
            | HistoryEvent::ActivityScheduled(_)
            | HistoryEvent::ActivityCompleted(_)
            | HistoryEvent::ActivityFailed(_) => {}
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
