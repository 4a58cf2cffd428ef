//! Host-facing API for starting and inspecting instances.

use std::sync::Arc;
use std::time::{Duration, Instant};

use history_store::{
    AppendOptions, FailureDetails, HistoryEvent, HistoryRecord, HistoryStore, HistoryStoreError,
    HistoryStoreExt, InstanceId, InstanceStatus, WorkflowInstance,
};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::OrchestrationError;
use crate::registry::OrchestrationRegistry;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Compact status of an instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceStatusView {
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetails>,
}

impl From<WorkflowInstance> for InstanceStatusView {
    fn from(instance: WorkflowInstance) -> Self {
        Self {
            instance_id: instance.instance_id,
            status: instance.status,
            output: instance.output,
            failure: instance.failure,
        }
    }
}

/// Starts, inspects and terminates orchestration instances.
#[derive(Clone)]
pub struct OrchestrationClient<S> {
    store: S,
    orchestrations: Arc<OrchestrationRegistry>,
    wake: mpsc::UnboundedSender<InstanceId>,
}

impl<S> OrchestrationClient<S>
where
    S: HistoryStore + Clone + 'static,
{
    pub(crate) fn new(
        store: S,
        orchestrations: Arc<OrchestrationRegistry>,
        wake: mpsc::UnboundedSender<InstanceId>,
    ) -> Self {
        Self {
            store,
            orchestrations,
            wake,
        }
    }

    /// Creates a new instance and returns its id without waiting for it to run.
    ///
    /// When `instance_id` is None a random id is generated.
    #[tracing::instrument(skip(self, input))]
    pub async fn start_instance(
        &self,
        orchestration: &str,
        input: &impl Serialize,
        instance_id: Option<&str>,
    ) -> crate::Result<InstanceId> {
        if !self.orchestrations.contains(orchestration) {
            return Err(OrchestrationError::UnknownOrchestration(
                orchestration.to_string(),
            ));
        }

        let instance_id = match instance_id {
            Some(raw) => InstanceId::parse(raw)?,
            None => InstanceId::new(),
        };
        let input = serde_json::to_value(input)?;

        self.store
            .create_instance(&instance_id, orchestration, input)
            .await?;

        metrics::counter!("orchestration_instances_started_total").increment(1);
        tracing::info!(%instance_id, "instance started");

        self.wake(&instance_id);
        Ok(instance_id)
    }

    pub async fn get_status(
        &self,
        instance_id: &InstanceId,
    ) -> crate::Result<Option<InstanceStatusView>> {
        Ok(self.get_instance(instance_id).await?.map(Into::into))
    }

    pub async fn get_instance(
        &self,
        instance_id: &InstanceId,
    ) -> crate::Result<Option<WorkflowInstance>> {
        Ok(self.store.get_instance(instance_id).await?)
    }

    /// Returns the full history; fails with `InstanceNotFound` for unknown ids.
    pub async fn get_history(&self, instance_id: &InstanceId) -> crate::Result<Vec<HistoryRecord>> {
        let history = self.store.read_all(instance_id).await?;
        if history.is_empty() {
            return Err(OrchestrationError::InstanceNotFound(instance_id.clone()));
        }
        Ok(history)
    }

    /// Requests termination. The instance stops at its next unresolved
    /// activity call.
    #[tracing::instrument(skip(self))]
    pub async fn terminate(&self, instance_id: &InstanceId, reason: &str) -> crate::Result<()> {
        match self
            .store
            .append_event(
                instance_id,
                HistoryEvent::termination_requested(reason),
                AppendOptions::new(),
            )
            .await
        {
            Ok(_) => {}
            Err(HistoryStoreError::InstanceNotFound(id)) => {
                return Err(OrchestrationError::InstanceNotFound(id));
            }
            Err(error) => return Err(error.into()),
        }

        tracing::info!(%instance_id, reason, "termination requested");
        self.wake(instance_id);
        Ok(())
    }

    /// Polls until the instance reaches a terminal state.
    pub async fn wait_for_completion(
        &self,
        instance_id: &InstanceId,
        timeout: Duration,
    ) -> crate::Result<WorkflowInstance> {
        let started = Instant::now();
        loop {
            let instance = self
                .get_instance(instance_id)
                .await?
                .ok_or_else(|| OrchestrationError::InstanceNotFound(instance_id.clone()))?;
            if instance.is_terminal() {
                return Ok(instance);
            }
            if started.elapsed() >= timeout {
                return Err(OrchestrationError::Timeout {
                    instance_id: instance_id.clone(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    fn wake(&self, instance_id: &InstanceId) {
        if self.wake.send(instance_id.clone()).is_err() {
            tracing::debug!(%instance_id, "scheduler is not running; instance will be picked up by polling");
        }
    }
}
