use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    ActivityId, HistoryEvent, HistoryRecord, HistoryStoreError, InstanceId, Result, SequenceNo,
    WorkflowInstance,
};

/// Options for appending events to an instance's history.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected last sequence number of the history (compare-and-append).
    /// If None, events are appended after whatever is currently there.
    pub expected_sequence: Option<SequenceNo>,
}

impl AppendOptions {
    /// Creates options with no sequence check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the history to end at `sequence`.
    pub fn expect_sequence(sequence: SequenceNo) -> Self {
        Self {
            expected_sequence: Some(sequence),
        }
    }
}

/// Durable, append-only storage for orchestration histories.
///
/// All implementations must be thread-safe (Send + Sync) and must enforce the
/// same append rules; both built-in backends delegate them to [`AppendGuard`].
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Creates a new instance by writing its `InstanceCreated` event at
    /// sequence 1.
    ///
    /// Fails with `InstanceAlreadyExists` if the id is taken.
    async fn create_instance(
        &self,
        instance_id: &InstanceId,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<SequenceNo>;

    /// Appends events to an existing instance.
    ///
    /// The batch is written atomically: either every event is stored or none
    /// is. Sequence numbers are assigned by the store. Returns the sequence
    /// number of the last appended event.
    async fn append(
        &self,
        instance_id: &InstanceId,
        events: Vec<HistoryEvent>,
        options: AppendOptions,
    ) -> Result<SequenceNo>;

    /// Returns the full history of an instance in sequence order.
    ///
    /// Unknown instances have an empty history.
    async fn read_all(&self, instance_id: &InstanceId) -> Result<Vec<HistoryRecord>>;

    /// Lists non-terminal instances with a wake event (creation, activity
    /// outcome, termination request) after their consumption mark.
    async fn list_runnable(&self) -> Result<Vec<InstanceId>>;

    /// Lists every non-terminal instance.
    async fn list_active(&self) -> Result<Vec<InstanceId>>;

    /// Records that an interpreter pass has seen the history up to `through`.
    ///
    /// The mark only moves forward.
    async fn mark_consumed(&self, instance_id: &InstanceId, through: SequenceNo) -> Result<()>;
}

/// Extension trait providing convenience methods on history stores.
#[async_trait]
pub trait HistoryStoreExt: HistoryStore {
    /// Appends a single event.
    async fn append_event(
        &self,
        instance_id: &InstanceId,
        event: HistoryEvent,
        options: AppendOptions,
    ) -> Result<SequenceNo> {
        self.append(instance_id, vec![event], options).await
    }

    /// Folds the instance's history into its current state.
    async fn get_instance(&self, instance_id: &InstanceId) -> Result<Option<WorkflowInstance>> {
        let records = self.read_all(instance_id).await?;
        WorkflowInstance::from_history(&records)
    }

    /// Returns the sequence number of the last event, or None if the instance
    /// doesn't exist.
    async fn last_sequence(&self, instance_id: &InstanceId) -> Result<Option<SequenceNo>> {
        let records = self.read_all(instance_id).await?;
        Ok(records.last().map(|r| r.sequence_no))
    }
}

// Blanket implementation for all HistoryStore implementations
impl<T: HistoryStore + ?Sized> HistoryStoreExt for T {}

/// Append rules shared by every backend.
///
/// Built from an instance's existing history, it decides whether a batch may
/// be appended.
#[derive(Debug, Clone)]
pub struct AppendGuard {
    instance_id: InstanceId,
    last_sequence: SequenceNo,
    terminal: bool,
    scheduled: HashSet<ActivityId>,
    resolved: HashSet<ActivityId>,
}

impl AppendGuard {
    /// Creates a guard for an instance with no events.
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            last_sequence: SequenceNo::initial(),
            terminal: false,
            scheduled: HashSet::new(),
            resolved: HashSet::new(),
        }
    }

    /// Creates a guard from existing records.
    pub fn from_records(instance_id: InstanceId, records: &[HistoryRecord]) -> Self {
        let mut guard = Self::new(instance_id);
        for record in records {
            guard.observe(record.sequence_no, &record.payload);
        }
        guard
    }

    /// Folds a stored event into the guard.
    pub fn observe(&mut self, sequence_no: SequenceNo, event: &HistoryEvent) {
        self.last_sequence = sequence_no;
        match event {
            HistoryEvent::ActivityScheduled(data) => {
                self.scheduled.insert(data.activity_id);
            }
            HistoryEvent::ActivityCompleted(data) => {
                self.resolved.insert(data.activity_id);
            }
            HistoryEvent::ActivityFailed(data) => {
                self.resolved.insert(data.activity_id);
            }
            _ => {}
        }
        if event.is_terminal() {
            self.terminal = true;
        }
    }

    pub fn last_sequence(&self) -> SequenceNo {
        self.last_sequence
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Validates a batch against the existing history.
    pub fn check(&self, events: &[HistoryEvent], options: &AppendOptions) -> Result<()> {
        if events.is_empty() {
            return Err(self.invalid("cannot append an empty batch"));
        }

        if self.terminal {
            return Err(HistoryStoreError::InstanceTerminal(self.instance_id.clone()));
        }

        if let Some(expected) = options.expected_sequence
            && expected != self.last_sequence
        {
            return Err(HistoryStoreError::ConcurrencyConflict {
                instance_id: self.instance_id.clone(),
                expected,
                actual: self.last_sequence,
            });
        }

        let mut scheduled_in_batch = HashSet::new();
        let mut resolved_in_batch = HashSet::new();
        let mut closed = false;

        for event in events {
            if closed {
                return Err(self.invalid("events follow a terminal event in the batch"));
            }

            match event {
                HistoryEvent::InstanceCreated(_) => {
                    return Err(self.invalid("InstanceCreated can only be written on creation"));
                }
                HistoryEvent::ActivityScheduled(data) => {
                    if self.scheduled.contains(&data.activity_id)
                        || !scheduled_in_batch.insert(data.activity_id)
                    {
                        return Err(self.invalid(format!(
                            "activity {} is already scheduled",
                            data.activity_id
                        )));
                    }
                }
                HistoryEvent::ActivityCompleted(_) | HistoryEvent::ActivityFailed(_) => {
                    if let Some(activity_id) = event.outcome_activity_id() {
                        self.check_outcome(
                            activity_id,
                            &scheduled_in_batch,
                            &mut resolved_in_batch,
                        )?;
                    }
                }
                _ => {}
            }

            closed = event.is_terminal();
        }

        Ok(())
    }

    fn check_outcome(
        &self,
        activity_id: ActivityId,
        scheduled_in_batch: &HashSet<ActivityId>,
        resolved_in_batch: &mut HashSet<ActivityId>,
    ) -> Result<()> {
        if !self.scheduled.contains(&activity_id) && !scheduled_in_batch.contains(&activity_id) {
            return Err(self.invalid(format!("activity {activity_id} was never scheduled")));
        }
        if self.resolved.contains(&activity_id) || !resolved_in_batch.insert(activity_id) {
            return Err(HistoryStoreError::DuplicateOutcome {
                instance_id: self.instance_id.clone(),
                activity_id,
            });
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> HistoryStoreError {
        HistoryStoreError::InvalidAppend {
            instance_id: self.instance_id.clone(),
            reason: reason.into(),
        }
    }
}
