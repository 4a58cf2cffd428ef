//! Replay state and the context handed to workflow programs.

use std::collections::{BTreeMap, HashMap};

use history_store::{ActivityId, HistoryEvent, HistoryRecord, InstanceId, SequenceNo};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{OrchestrationError, WorkflowError, WorkflowResult};

/// An activity request made by a program: name plus JSON input.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityCall {
    pub name: String,
    pub input: Value,
}

impl ActivityCall {
    /// Builds a call, serializing `input`.
    pub fn new(name: impl Into<String>, input: &impl Serialize) -> WorkflowResult<Self> {
        Ok(Self {
            name: name.into(),
            input: serde_json::to_value(input)?,
        })
    }
}

/// An activity call that has been given an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledActivity {
    pub activity_id: ActivityId,
    pub name: String,
    pub input: Value,
}

/// Recorded outcome of an activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    Completed(Value),
    Failed(String),
}

/// Everything a replay pass needs to know about an instance's history,
/// indexed by activity id.
#[derive(Debug, Clone)]
pub struct HistoryCursor {
    instance_id: InstanceId,
    orchestration: String,
    input: Value,
    started: bool,
    terminal: bool,
    termination: Option<String>,
    scheduled: BTreeMap<ActivityId, ScheduledActivity>,
    outcomes: HashMap<ActivityId, ActivityOutcome>,
    last_sequence: SequenceNo,
}

impl HistoryCursor {
    /// Indexes an instance's history.
    pub fn new(instance_id: &InstanceId, history: &[HistoryRecord]) -> crate::Result<Self> {
        let corrupt = |reason: String| OrchestrationError::CorruptHistory {
            instance_id: instance_id.clone(),
            reason,
        };

        let Some((first, rest)) = history.split_first() else {
            return Err(corrupt("history is empty".to_string()));
        };
        let HistoryEvent::InstanceCreated(created) = &first.payload else {
            return Err(corrupt(format!("history starts with {}", first.kind)));
        };

        let mut cursor = Self {
            instance_id: instance_id.clone(),
            orchestration: created.orchestration.clone(),
            input: created.input.clone(),
            started: false,
            terminal: false,
            termination: None,
            scheduled: BTreeMap::new(),
            outcomes: HashMap::new(),
            last_sequence: first.sequence_no,
        };

        for record in rest {
            cursor.last_sequence = record.sequence_no;
            match &record.payload {
                HistoryEvent::InstanceCreated(_) => {
                    return Err(corrupt(format!(
                        "second InstanceCreated at sequence {}",
                        record.sequence_no
                    )));
                }
                HistoryEvent::OrchestratorStarted => cursor.started = true,
                HistoryEvent::ActivityScheduled(data) => {
                    cursor.scheduled.insert(
                        data.activity_id,
                        ScheduledActivity {
                            activity_id: data.activity_id,
                            name: data.activity_name.clone(),
                            input: data.input.clone(),
                        },
                    );
                }
                HistoryEvent::ActivityCompleted(data) => {
                    cursor.record_outcome(
                        data.activity_id,
                        ActivityOutcome::Completed(data.result.clone()),
                    )?;
                }
                HistoryEvent::ActivityFailed(data) => {
                    cursor.record_outcome(
                        data.activity_id,
                        ActivityOutcome::Failed(data.error.clone()),
                    )?;
                }
                HistoryEvent::TerminationRequested(data) => {
                    cursor.termination.get_or_insert_with(|| data.reason.clone());
                }
                HistoryEvent::OrchestratorCompleted(_)
                | HistoryEvent::OrchestratorFailed(_)
                | HistoryEvent::OrchestratorTerminated(_) => cursor.terminal = true,
            }
        }

        Ok(cursor)
    }

    fn record_outcome(&mut self, activity_id: ActivityId, outcome: ActivityOutcome) -> crate::Result<()> {
        if !self.scheduled.contains_key(&activity_id) {
            return Err(OrchestrationError::CorruptHistory {
                instance_id: self.instance_id.clone(),
                reason: format!("outcome for unscheduled activity {activity_id}"),
            });
        }
        self.outcomes.insert(activity_id, outcome);
        Ok(())
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn orchestration(&self) -> &str {
        &self.orchestration
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    /// True once an `OrchestratorStarted` event is in history.
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Reason of the first termination request, if any.
    pub fn termination_reason(&self) -> Option<&str> {
        self.termination.as_deref()
    }

    pub fn last_sequence(&self) -> SequenceNo {
        self.last_sequence
    }

    pub fn scheduled(&self, activity_id: ActivityId) -> Option<&ScheduledActivity> {
        self.scheduled.get(&activity_id)
    }

    pub fn outcome(&self, activity_id: ActivityId) -> Option<&ActivityOutcome> {
        self.outcomes.get(&activity_id)
    }

    /// Scheduled activities that have no outcome yet, in id order.
    pub fn pending_activities(&self) -> Vec<ScheduledActivity> {
        self.scheduled
            .values()
            .filter(|activity| !self.outcomes.contains_key(&activity.activity_id))
            .cloned()
            .collect()
    }

    /// First scheduled id at or after `from`, used to find history the
    /// program no longer asks for.
    pub(crate) fn first_scheduled_from(&self, from: ActivityId) -> Option<&ScheduledActivity> {
        self.scheduled.range(from..).next().map(|(_, activity)| activity)
    }
}

enum Resolution {
    Completed(Value),
    Failed(String),
    Pending,
}

/// The program's only window onto the engine.
///
/// Each activity call takes the next sequential [`ActivityId`]. A call whose
/// outcome is already in history returns it; a call without one is either
/// recorded as a new command or, if it was scheduled by an earlier pass, left
/// waiting. In both cases the call returns [`WorkflowError::Suspended`].
pub struct WorkflowContext<'a> {
    cursor: &'a HistoryCursor,
    next_id: ActivityId,
    commands: Vec<ScheduledActivity>,
}

impl<'a> WorkflowContext<'a> {
    pub fn new(cursor: &'a HistoryCursor) -> Self {
        Self {
            cursor,
            next_id: ActivityId::default(),
            commands: Vec::new(),
        }
    }

    /// Deserializes the instance input.
    pub fn get_input<T: DeserializeOwned>(&self) -> WorkflowResult<T> {
        Ok(serde_json::from_value(self.cursor.input().clone())?)
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.cursor.instance_id()
    }

    /// True while the program is re-executing calls already in history.
    pub fn is_replaying(&self) -> bool {
        self.cursor.scheduled(self.next_id).is_some()
    }

    /// Calls one activity and waits for its result.
    pub fn call_activity<T: DeserializeOwned>(
        &mut self,
        name: &str,
        input: &impl Serialize,
    ) -> WorkflowResult<T> {
        let call = ActivityCall::new(name, input)?;
        let activity_id = self.claim_id();

        match self.resolve(activity_id, &call)? {
            Resolution::Completed(value) => Ok(serde_json::from_value(value)?),
            Resolution::Failed(message) => Err(WorkflowError::ActivityFailed {
                activity_id,
                name: call.name,
                message,
            }),
            Resolution::Pending => Err(WorkflowError::Suspended),
        }
    }

    /// Calls several independent activities at once and waits for all of
    /// them.
    ///
    /// Results come back in declared order. If any member failed, the group
    /// fails with the first failure in declared order; siblings that
    /// succeeded keep their outcomes.
    pub fn call_activity_group(&mut self, calls: Vec<ActivityCall>) -> WorkflowResult<Vec<Value>> {
        let total = calls.len();
        let ids: Vec<ActivityId> = calls.iter().map(|_| self.claim_id()).collect();

        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut pending = false;

        for (activity_id, call) in ids.into_iter().zip(calls) {
            match self.resolve(activity_id, &call)? {
                Resolution::Completed(value) => results.push(value),
                Resolution::Failed(message) => failures.push((call.name, message)),
                Resolution::Pending => pending = true,
            }
        }

        if pending {
            return Err(WorkflowError::Suspended);
        }

        let failed = failures.len();
        if let Some((name, message)) = failures.into_iter().next() {
            return Err(WorkflowError::GroupFailed {
                failed,
                total,
                name,
                message,
            });
        }

        Ok(results)
    }

    fn claim_id(&mut self) -> ActivityId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    fn resolve(&mut self, activity_id: ActivityId, call: &ActivityCall) -> WorkflowResult<Resolution> {
        let already_scheduled = match self.cursor.scheduled(activity_id) {
            Some(recorded) => {
                if recorded.name != call.name {
                    return Err(WorkflowError::NonDeterminism(format!(
                        "activity {activity_id} was recorded as '{}' but the program called '{}'",
                        recorded.name, call.name
                    )));
                }
                if recorded.input != call.input {
                    return Err(WorkflowError::NonDeterminism(format!(
                        "activity {activity_id} ('{}') was called with different input",
                        call.name
                    )));
                }
                true
            }
            None => false,
        };

        match self.cursor.outcome(activity_id) {
            Some(ActivityOutcome::Completed(value)) => return Ok(Resolution::Completed(value.clone())),
            Some(ActivityOutcome::Failed(message)) => return Ok(Resolution::Failed(message.clone())),
            None => {}
        }

        if let Some(reason) = self.cursor.termination_reason() {
            return Err(WorkflowError::Terminated(reason.to_string()));
        }

        if !already_scheduled {
            self.commands.push(ScheduledActivity {
                activity_id,
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        Ok(Resolution::Pending)
    }

    /// Ends the pass, returning the new commands and the next unclaimed id.
    pub(crate) fn finish(self) -> (Vec<ScheduledActivity>, ActivityId) {
        (self.commands, self.next_id)
    }
}
