//! Drives orchestration instances forward.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream;
use history_store::{
    AppendOptions, FailureKind, HistoryEvent, HistoryStore, HistoryStoreError, InstanceId,
    InstanceStatus, WorkflowInstance,
};
use tokio::sync::{Semaphore, mpsc};

use crate::client::OrchestrationClient;
use crate::context::HistoryCursor;
use crate::dispatcher::{Dispatcher, RetryPolicy};
use crate::interpreter::Interpreter;
use crate::registry::{ActivityRegistry, OrchestrationRegistry};

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Maximum number of instances processed concurrently.
    pub worker_count: usize,
    /// How often runnable instances are polled when no wake arrives.
    pub poll_interval: Duration,
    /// Attempts at appending a pass before giving up on a contended instance.
    pub max_append_attempts: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            worker_count: 8,
            poll_interval: Duration::from_millis(500),
            max_append_attempts: 5,
        }
    }
}

/// Result of one [`Scheduler::process_instance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The instance is unknown or already terminal.
    Skipped,
    /// The pass had nothing to write; the instance is waiting on activities.
    Waiting,
    /// New events were persisted.
    Advanced {
        status: InstanceStatus,
        dispatched: usize,
    },
    /// Every append attempt lost a race with another writer.
    Contended,
}

/// Process-wide orchestration scheduler.
///
/// Each instance is processed by at most one pass at a time (the instance
/// lease). A pass reads the history, replays the program, appends the new
/// events with compare-and-append, advances the consumption mark and hands
/// new activities to the [`Dispatcher`].
#[derive(Clone)]
pub struct Scheduler<S> {
    store: S,
    orchestrations: Arc<OrchestrationRegistry>,
    dispatcher: Dispatcher<S>,
    options: SchedulerOptions,
    leases: Arc<Mutex<HashMap<InstanceId, Arc<tokio::sync::Mutex<()>>>>>,
    queued: Arc<Mutex<HashSet<InstanceId>>>,
    wake_tx: mpsc::UnboundedSender<InstanceId>,
    wake_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<InstanceId>>>,
}

impl<S> Scheduler<S>
where
    S: HistoryStore + Clone + 'static,
{
    /// Creates a scheduler and its dispatcher.
    pub fn new(
        store: S,
        orchestrations: OrchestrationRegistry,
        activities: ActivityRegistry,
        options: SchedulerOptions,
        retry: RetryPolicy,
    ) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(store.clone(), activities, retry, wake_tx.clone());

        Self {
            store,
            orchestrations: Arc::new(orchestrations),
            dispatcher,
            options,
            leases: Arc::new(Mutex::new(HashMap::new())),
            queued: Arc::new(Mutex::new(HashSet::new())),
            wake_tx,
            wake_rx: Arc::new(tokio::sync::Mutex::new(wake_rx)),
        }
    }

    /// Returns a client that starts instances on this scheduler.
    pub fn client(&self) -> OrchestrationClient<S> {
        OrchestrationClient::new(
            self.store.clone(),
            self.orchestrations.clone(),
            self.wake_tx.clone(),
        )
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// Re-dispatches every scheduled activity that has no outcome.
    ///
    /// Covers a crash between persisting `ActivityScheduled` and handing the
    /// activity to the dispatcher. Returns the number of dispatches.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> crate::Result<usize> {
        let mut dispatched = 0;
        for instance_id in self.store.list_active().await? {
            let history = self.store.read_all(&instance_id).await?;
            if history.is_empty() {
                continue;
            }
            let cursor = HistoryCursor::new(&instance_id, &history)?;
            for activity in cursor.pending_activities() {
                if self.dispatcher.dispatch(&instance_id, activity) {
                    dispatched += 1;
                }
            }
        }

        tracing::info!(dispatched, "recovery complete");
        Ok(dispatched)
    }

    /// Runs one interpreter pass for an instance.
    #[tracing::instrument(skip(self))]
    pub async fn process_instance(&self, instance_id: &InstanceId) -> crate::Result<PassOutcome> {
        let lease = self.lease(instance_id);
        let _held = lease.lock().await;

        let started = Instant::now();
        let outcome = self.run_pass(instance_id).await;

        metrics::counter!("orchestration_passes_total").increment(1);
        metrics::histogram!("orchestration_pass_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if matches!(
            outcome,
            Ok(PassOutcome::Skipped)
                | Ok(PassOutcome::Advanced {
                    status: InstanceStatus::Completed
                        | InstanceStatus::Failed
                        | InstanceStatus::Terminated,
                    ..
                })
        ) {
            self.release_lease(instance_id);
        }

        outcome
    }

    async fn run_pass(&self, instance_id: &InstanceId) -> crate::Result<PassOutcome> {
        for attempt in 1..=self.options.max_append_attempts {
            let history = self.store.read_all(instance_id).await?;
            let Some(instance) = WorkflowInstance::from_history(&history)? else {
                return Ok(PassOutcome::Skipped);
            };
            if instance.is_terminal() {
                return Ok(PassOutcome::Skipped);
            }
            let last_seen = instance.last_sequence;

            let result = match self.orchestrations.get(&instance.orchestration) {
                Some(orchestration) => {
                    Interpreter::replay(orchestration.as_ref(), instance_id, &history)?
                }
                None => {
                    tracing::error!(
                        orchestration = %instance.orchestration,
                        "no orchestration registered under this name"
                    );
                    crate::ReplayResult {
                        new_events: vec![HistoryEvent::orchestrator_failed(
                            FailureKind::Application,
                            format!("orchestration '{}' is not registered", instance.orchestration),
                        )],
                        commands: Vec::new(),
                        status: InstanceStatus::Failed,
                    }
                }
            };

            if result.new_events.is_empty() {
                self.store.mark_consumed(instance_id, last_seen).await?;
                return Ok(PassOutcome::Waiting);
            }

            match self
                .store
                .append(
                    instance_id,
                    result.new_events,
                    AppendOptions::expect_sequence(last_seen),
                )
                .await
            {
                Ok(sequence) => {
                    self.store.mark_consumed(instance_id, sequence).await?;

                    let dispatched = result.commands.len();
                    for command in result.commands {
                        self.dispatcher.dispatch(instance_id, command);
                    }

                    self.record_status(instance_id, &instance.orchestration, result.status);
                    return Ok(PassOutcome::Advanced {
                        status: result.status,
                        dispatched,
                    });
                }
                Err(HistoryStoreError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(attempt, "history moved during pass, replaying again");
                }
                Err(HistoryStoreError::InstanceTerminal(_)) => return Ok(PassOutcome::Skipped),
                Err(error) => return Err(error.into()),
            }
        }

        tracing::warn!("giving up on contended instance for now");
        Ok(PassOutcome::Contended)
    }

    fn record_status(&self, instance_id: &InstanceId, orchestration: &str, status: InstanceStatus) {
        match status {
            InstanceStatus::Completed => {
                metrics::counter!("orchestration_instances_completed_total").increment(1);
                tracing::info!(%instance_id, orchestration, "instance completed");
            }
            InstanceStatus::Failed => {
                metrics::counter!("orchestration_instances_failed_total").increment(1);
                tracing::warn!(%instance_id, orchestration, "instance failed");
            }
            InstanceStatus::Terminated => {
                tracing::info!(%instance_id, orchestration, "instance terminated");
            }
            InstanceStatus::Pending | InstanceStatus::Running => {}
        }
    }

    /// Processes runnable instances until nothing is runnable and no
    /// activity is in flight.
    pub async fn run_until_idle(&self) -> crate::Result<()> {
        let mut wake_rx = self.wake_rx.lock().await;

        loop {
            let runnable = self.store.list_runnable().await?;

            if runnable.is_empty() {
                if self.dispatcher.in_flight() == 0 {
                    // An activity may have recorded its outcome after the
                    // listing above; look once more before stopping.
                    if self.store.list_runnable().await?.is_empty() {
                        return Ok(());
                    }
                    continue;
                }
                let _ = tokio::time::timeout(self.options.poll_interval, wake_rx.recv()).await;
                continue;
            }

            let results: Vec<_> = stream::iter(runnable)
                .map(|instance_id| async move { self.process_instance(&instance_id).await })
                .buffer_unordered(self.options.worker_count.max(1))
                .collect()
                .await;

            for result in results {
                result?;
            }
        }
    }

    /// Runs the scheduler until `shutdown` resolves.
    ///
    /// Recovers first, then processes instances as wakes arrive, with a
    /// periodic poll of runnable instances as a backstop.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> crate::Result<()> {
        if let Err(error) = self.recover().await {
            tracing::error!(error = %error, "recovery failed");
        }

        let workers = Arc::new(Semaphore::new(self.options.worker_count.max(1)));
        let mut wake_rx = self.wake_rx.lock().await;
        let mut poll = tokio::time::interval(self.options.poll_interval);
        tokio::pin!(shutdown);

        tracing::info!(
            workers = self.options.worker_count,
            poll_interval = ?self.options.poll_interval,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("scheduler shutting down");
                    return Ok(());
                }
                Some(instance_id) = wake_rx.recv() => {
                    self.spawn_pass(instance_id, &workers);
                }
                _ = poll.tick() => {
                    match self.store.list_runnable().await {
                        Ok(runnable) => {
                            for instance_id in runnable {
                                self.spawn_pass(instance_id, &workers);
                            }
                        }
                        Err(error) => tracing::warn!(error = %error, "failed to list runnable instances"),
                    }
                }
            }
        }
    }

    fn spawn_pass(&self, instance_id: InstanceId, workers: &Arc<Semaphore>) {
        if !lock(&self.queued).insert(instance_id.clone()) {
            return;
        }

        let this = self.clone();
        let workers = workers.clone();
        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            lock(&this.queued).remove(&instance_id);

            if let Err(error) = this.process_instance(&instance_id).await {
                tracing::error!(%instance_id, error = %error, "orchestration pass failed");
            }
        });
    }

    fn lease(&self, instance_id: &InstanceId) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.leases)
            .entry(instance_id.clone())
            .or_default()
            .clone()
    }

    fn release_lease(&self, instance_id: &InstanceId) {
        lock(&self.leases).remove(instance_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
