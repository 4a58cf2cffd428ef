use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::InstanceId;

/// Position of an event within one instance's history.
///
/// Sequence numbers start at 1 for the `InstanceCreated` event and increase
/// by 1 for every appended event. `0` means "no events yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNo(i64);

impl SequenceNo {
    /// Creates a sequence number from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the sequence number (0) of an instance with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the sequence number (1) of the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for SequenceNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SequenceNo {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Identifier of an activity call within one instance.
///
/// Ids are handed out in call order during a replay pass (0, 1, 2, ...), so
/// the same program over the same history always produces the same ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActivityId(u64);

impl ActivityId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events recorded in an orchestration instance's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HistoryEvent {
    /// The instance was created with its input.
    InstanceCreated(InstanceCreatedData),

    /// The interpreter ran the program for the first time.
    OrchestratorStarted,

    /// The program requested an activity.
    ActivityScheduled(ActivityScheduledData),

    /// An activity returned a result.
    ActivityCompleted(ActivityCompletedData),

    /// An activity failed permanently.
    ActivityFailed(ActivityFailedData),

    /// A caller asked for the instance to stop.
    TerminationRequested(TerminationData),

    /// The program returned an output.
    OrchestratorCompleted(OrchestratorCompletedData),

    /// The program failed.
    OrchestratorFailed(OrchestratorFailedData),

    /// The program stopped because of a termination request.
    OrchestratorTerminated(TerminationData),
}

impl HistoryEvent {
    /// Returns the event kind as stored alongside the payload.
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::InstanceCreated(_) => "InstanceCreated",
            HistoryEvent::OrchestratorStarted => "OrchestratorStarted",
            HistoryEvent::ActivityScheduled(_) => "ActivityScheduled",
            HistoryEvent::ActivityCompleted(_) => "ActivityCompleted",
            HistoryEvent::ActivityFailed(_) => "ActivityFailed",
            HistoryEvent::TerminationRequested(_) => "TerminationRequested",
            HistoryEvent::OrchestratorCompleted(_) => "OrchestratorCompleted",
            HistoryEvent::OrchestratorFailed(_) => "OrchestratorFailed",
            HistoryEvent::OrchestratorTerminated(_) => "OrchestratorTerminated",
        }
    }

    /// Returns true if this event ends the instance.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistoryEvent::OrchestratorCompleted(_)
                | HistoryEvent::OrchestratorFailed(_)
                | HistoryEvent::OrchestratorTerminated(_)
        )
    }

    /// Returns true if this event should trigger another interpreter pass.
    pub fn is_wake(&self) -> bool {
        matches!(
            self,
            HistoryEvent::InstanceCreated(_)
                | HistoryEvent::ActivityCompleted(_)
                | HistoryEvent::ActivityFailed(_)
                | HistoryEvent::TerminationRequested(_)
        )
    }

    /// Returns the activity id of an outcome event.
    pub fn outcome_activity_id(&self) -> Option<ActivityId> {
        match self {
            HistoryEvent::ActivityCompleted(data) => Some(data.activity_id),
            HistoryEvent::ActivityFailed(data) => Some(data.activity_id),
            _ => None,
        }
    }

    pub fn instance_created(orchestration: impl Into<String>, input: serde_json::Value) -> Self {
        HistoryEvent::InstanceCreated(InstanceCreatedData {
            orchestration: orchestration.into(),
            input,
        })
    }

    pub fn activity_scheduled(
        activity_id: ActivityId,
        activity_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        HistoryEvent::ActivityScheduled(ActivityScheduledData {
            activity_id,
            activity_name: activity_name.into(),
            input,
        })
    }

    pub fn activity_completed(activity_id: ActivityId, result: serde_json::Value) -> Self {
        HistoryEvent::ActivityCompleted(ActivityCompletedData {
            activity_id,
            result,
        })
    }

    pub fn activity_failed(activity_id: ActivityId, error: impl Into<String>) -> Self {
        HistoryEvent::ActivityFailed(ActivityFailedData {
            activity_id,
            error: error.into(),
        })
    }

    pub fn termination_requested(reason: impl Into<String>) -> Self {
        HistoryEvent::TerminationRequested(TerminationData {
            reason: reason.into(),
        })
    }

    pub fn orchestrator_completed(output: serde_json::Value) -> Self {
        HistoryEvent::OrchestratorCompleted(OrchestratorCompletedData { output })
    }

    pub fn orchestrator_failed(kind: FailureKind, message: impl Into<String>) -> Self {
        HistoryEvent::OrchestratorFailed(OrchestratorFailedData {
            error: FailureDetails::new(kind, message),
        })
    }

    pub fn orchestrator_terminated(reason: impl Into<String>) -> Self {
        HistoryEvent::OrchestratorTerminated(TerminationData {
            reason: reason.into(),
        })
    }
}

/// Data for InstanceCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceCreatedData {
    /// Name of the registered orchestration to run.
    pub orchestration: String,

    /// Input handed to the program.
    pub input: serde_json::Value,
}

/// Data for ActivityScheduled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityScheduledData {
    pub activity_id: ActivityId,
    pub activity_name: String,
    pub input: serde_json::Value,
}

/// Data for ActivityCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCompletedData {
    pub activity_id: ActivityId,
    pub result: serde_json::Value,
}

/// Data for ActivityFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityFailedData {
    pub activity_id: ActivityId,
    pub error: String,
}

/// Data for TerminationRequested and OrchestratorTerminated events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationData {
    pub reason: String,
}

/// Data for OrchestratorCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorCompletedData {
    pub output: serde_json::Value,
}

/// Data for OrchestratorFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorFailedData {
    pub error: FailureDetails,
}

/// Classification of an instance failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The input was rejected by the program before any activity ran.
    Validation,
    /// An activity failed and the program did not handle it.
    Activity,
    /// The program's calls no longer match the recorded history.
    NonDeterminism,
    /// Any other program error.
    Application,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "Validation",
            FailureKind::Activity => "Activity",
            FailureKind::NonDeterminism => "NonDeterminism",
            FailureKind::Application => "Application",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an instance failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureDetails {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A persisted history event with its position and write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The instance this event belongs to.
    pub instance_id: InstanceId,

    /// Position of the event in the instance's history.
    pub sequence_no: SequenceNo,

    /// The event kind (e.g., "ActivityScheduled").
    pub kind: String,

    /// The event itself.
    pub payload: HistoryEvent,

    /// When the event was written.
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    /// Wraps an event for storage at the given position.
    pub fn new(instance_id: InstanceId, sequence_no: SequenceNo, payload: HistoryEvent) -> Self {
        Self {
            instance_id,
            sequence_no,
            kind: payload.kind().to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ordering() {
        let s1 = SequenceNo::new(1);
        let s2 = SequenceNo::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
        assert_eq!(SequenceNo::initial().next(), SequenceNo::first());
    }

    #[test]
    fn events_serialize_adjacently_tagged() {
        let event = HistoryEvent::activity_scheduled(
            ActivityId::new(3),
            "CalculateTaxes",
            serde_json::json!({"order_id": "O1"}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ActivityScheduled");
        assert_eq!(json["data"]["activity_id"], 3);
        assert_eq!(json["data"]["activity_name"], "CalculateTaxes");

        let back: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unit_event_round_trips() {
        let json = serde_json::to_value(HistoryEvent::OrchestratorStarted).unwrap();
        assert_eq!(json, serde_json::json!({"type": "OrchestratorStarted"}));
        let back: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, HistoryEvent::OrchestratorStarted);
    }

    #[test]
    fn terminal_and_wake_classification() {
        assert!(HistoryEvent::orchestrator_completed(serde_json::json!("ok")).is_terminal());
        assert!(HistoryEvent::orchestrator_failed(FailureKind::Activity, "boom").is_terminal());
        assert!(HistoryEvent::orchestrator_terminated("stop").is_terminal());
        assert!(!HistoryEvent::termination_requested("stop").is_terminal());

        assert!(HistoryEvent::termination_requested("stop").is_wake());
        assert!(HistoryEvent::activity_failed(ActivityId::new(0), "x").is_wake());
        assert!(!HistoryEvent::OrchestratorStarted.is_wake());
        assert!(
            !HistoryEvent::activity_scheduled(ActivityId::new(0), "A", serde_json::Value::Null)
                .is_wake()
        );
    }

    #[test]
    fn record_kind_matches_payload() {
        let record = HistoryRecord::new(
            InstanceId::parse("i-1").unwrap(),
            SequenceNo::first(),
            HistoryEvent::instance_created("ProcessOrder", serde_json::json!({})),
        );
        assert_eq!(record.kind, "InstanceCreated");
    }
}
