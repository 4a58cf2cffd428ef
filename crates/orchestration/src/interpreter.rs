//! Deterministic replay of workflow programs.

use history_store::{FailureKind, HistoryEvent, HistoryRecord, InstanceId, InstanceStatus};

use crate::context::{HistoryCursor, ScheduledActivity, WorkflowContext};
use crate::error::WorkflowError;
use crate::registry::Orchestration;

/// What one interpreter pass decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    /// Events to append, in order.
    pub new_events: Vec<HistoryEvent>,
    /// Activities to dispatch once `new_events` are persisted.
    pub commands: Vec<ScheduledActivity>,
    /// Instance status after `new_events` are applied.
    pub status: InstanceStatus,
}

impl ReplayResult {
    fn unchanged(status: InstanceStatus) -> Self {
        Self {
            new_events: Vec::new(),
            commands: Vec::new(),
            status,
        }
    }
}

/// Runs workflow programs against recorded history.
///
/// A pass is a pure function of the program and the history: it never reads
/// the clock and never performs I/O, so replaying the same history twice
/// yields the same result.
pub struct Interpreter;

impl Interpreter {
    /// Replays `orchestration` over `history` and reports what to persist
    /// and dispatch next.
    pub fn replay(
        orchestration: &dyn Orchestration,
        instance_id: &InstanceId,
        history: &[HistoryRecord],
    ) -> crate::Result<ReplayResult> {
        let cursor = HistoryCursor::new(instance_id, history)?;

        if cursor.is_terminal() {
            let status = history_store::WorkflowInstance::from_history(history)?
                .map(|instance| instance.status)
                .unwrap_or(InstanceStatus::Completed);
            return Ok(ReplayResult::unchanged(status));
        }

        let mut new_events = Vec::new();
        if !cursor.is_started() {
            new_events.push(HistoryEvent::OrchestratorStarted);
        }

        let mut ctx = WorkflowContext::new(&cursor);
        let outcome = orchestration.run(&mut ctx);
        let (commands, next_id) = ctx.finish();

        let outcome = match (outcome, cursor.first_scheduled_from(next_id)) {
            (Err(WorkflowError::NonDeterminism(message)), _) => {
                Err(WorkflowError::NonDeterminism(message))
            }
            (_, Some(orphan)) => Err(WorkflowError::NonDeterminism(format!(
                "history contains activity {} ('{}') that the program no longer calls",
                orphan.activity_id, orphan.name
            ))),
            (other, None) => other,
        };

        let (terminal, commands) = match outcome {
            Ok(output) => (
                Some(HistoryEvent::orchestrator_completed(output)),
                Vec::new(),
            ),
            Err(WorkflowError::Suspended) => (None, commands),
            Err(WorkflowError::Terminated(reason)) => (
                Some(HistoryEvent::orchestrator_terminated(reason)),
                Vec::new(),
            ),
            Err(error) => {
                let kind = error.failure_kind().unwrap_or(FailureKind::Application);
                if kind == FailureKind::NonDeterminism {
                    metrics::counter!("orchestration_nondeterminism_total").increment(1);
                    tracing::error!(
                        %instance_id,
                        orchestration = cursor.orchestration(),
                        error = %error,
                        "nondeterministic orchestration detected"
                    );
                }
                (
                    Some(HistoryEvent::orchestrator_failed(kind, error.to_string())),
                    Vec::new(),
                )
            }
        };

        new_events.extend(commands.iter().map(|command| {
            HistoryEvent::activity_scheduled(
                command.activity_id,
                command.name.clone(),
                command.input.clone(),
            )
        }));

        let status = match &terminal {
            Some(HistoryEvent::OrchestratorCompleted(_)) => InstanceStatus::Completed,
            Some(HistoryEvent::OrchestratorTerminated(_)) => InstanceStatus::Terminated,
            Some(_) => InstanceStatus::Failed,
            None => InstanceStatus::Running,
        };
        new_events.extend(terminal);

        Ok(ReplayResult {
            new_events,
            commands,
            status,
        })
    }
}
