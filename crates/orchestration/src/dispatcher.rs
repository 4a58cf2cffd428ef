//! Activity dispatch with retries and at-most-once outcome recording.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use history_store::{
    ActivityId, AppendOptions, HistoryEvent, HistoryStore, HistoryStoreError, HistoryStoreExt,
    InstanceId,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::ScheduledActivity;
use crate::error::ActivityError;
use crate::registry::ActivityRegistry;

const RECORD_ATTEMPTS: u32 = 5;

/// Retry settings for transient activity failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let secs = (self.initial_backoff.as_secs_f64() * factor).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Runs scheduled activities and records their outcomes.
///
/// Each dispatch runs on its own tokio task. An activity is invoked at least
/// once; its outcome is recorded at most once because the history store
/// rejects a second outcome for the same id. After recording, the instance
/// is sent on the wake channel so the scheduler runs another pass.
#[derive(Clone)]
pub struct Dispatcher<S> {
    store: S,
    activities: Arc<ActivityRegistry>,
    retry: RetryPolicy,
    in_flight: Arc<Mutex<HashSet<(InstanceId, ActivityId)>>>,
    wake: mpsc::UnboundedSender<InstanceId>,
}

impl<S> Dispatcher<S>
where
    S: HistoryStore + Clone + 'static,
{
    pub fn new(
        store: S,
        activities: ActivityRegistry,
        retry: RetryPolicy,
        wake: mpsc::UnboundedSender<InstanceId>,
    ) -> Self {
        Self {
            store,
            activities: Arc::new(activities),
            retry,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            wake,
        }
    }

    /// Starts running `activity` in the background.
    ///
    /// Returns false if the same activity of the same instance is already in
    /// flight in this process.
    pub fn dispatch(&self, instance_id: &InstanceId, activity: ScheduledActivity) -> bool {
        let key = (instance_id.clone(), activity.activity_id);
        if !self.lock_in_flight().insert(key.clone()) {
            tracing::debug!(
                %instance_id,
                activity_id = %activity.activity_id,
                "activity already in flight"
            );
            return false;
        }

        metrics::counter!("activity_dispatched_total", "activity" => activity.name.clone())
            .increment(1);

        let this = self.clone();
        let instance_id = instance_id.clone();
        tokio::spawn(async move {
            let event = match this.invoke(&instance_id, &activity).await {
                Ok(result) => HistoryEvent::activity_completed(activity.activity_id, result),
                Err(error) => HistoryEvent::activity_failed(activity.activity_id, error.to_string()),
            };
            this.record_outcome(&instance_id, event).await;
            this.lock_in_flight().remove(&key);
            // The scheduler may already be gone during shutdown.
            let _ = this.wake.send(instance_id);
        });

        true
    }

    /// Number of activities currently running in this process.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<(InstanceId, ActivityId)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[tracing::instrument(
        skip(self, activity),
        fields(activity = %activity.name, activity_id = %activity.activity_id)
    )]
    async fn invoke(
        &self,
        instance_id: &InstanceId,
        activity: &ScheduledActivity,
    ) -> Result<Value, ActivityError> {
        let Some(handler) = self.activities.get(&activity.name) else {
            tracing::warn!("no activity registered under this name");
            metrics::counter!("activity_failed_total", "activity" => activity.name.clone())
                .increment(1);
            return Err(ActivityError::failed(format!(
                "activity '{}' is not registered",
                activity.name
            )));
        };

        let mut attempt = 1;
        loop {
            match handler.invoke(activity.input.clone()).await {
                Ok(result) => {
                    metrics::counter!("activity_completed_total", "activity" => activity.name.clone())
                        .increment(1);
                    tracing::debug!(attempt, "activity completed");
                    return Ok(result);
                }
                Err(ActivityError::Transient(message)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    metrics::counter!("activity_retries_total", "activity" => activity.name.clone())
                        .increment(1);
                    tracing::warn!(attempt, ?delay, error = %message, "transient activity failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    metrics::counter!("activity_failed_total", "activity" => activity.name.clone())
                        .increment(1);
                    tracing::warn!(attempt, error = %error, "activity failed");
                    return Err(error);
                }
            }
        }
    }

    /// Appends the outcome, retrying store errors with backoff.
    async fn record_outcome(&self, instance_id: &InstanceId, event: HistoryEvent) {
        let mut attempt = 1;
        loop {
            match self
                .store
                .append_event(instance_id, event.clone(), AppendOptions::new())
                .await
            {
                Ok(_) => return,
                Err(HistoryStoreError::DuplicateOutcome { activity_id, .. }) => {
                    tracing::debug!(%instance_id, %activity_id, "outcome already recorded");
                    return;
                }
                Err(HistoryStoreError::InstanceTerminal(_)) => {
                    tracing::debug!(%instance_id, "instance finished before outcome was recorded");
                    return;
                }
                Err(error @ HistoryStoreError::InstanceNotFound(_))
                | Err(error @ HistoryStoreError::InvalidAppend { .. }) => {
                    tracing::warn!(%instance_id, error = %error, "dropping activity outcome");
                    return;
                }
                Err(error) if attempt < RECORD_ATTEMPTS => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(%instance_id, attempt, error = %error, "failed to record outcome, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    // Left unrecorded; recovery re-dispatches it on the next start.
                    tracing::error!(%instance_id, error = %error, "giving up recording activity outcome");
                    return;
                }
            }
        }
    }
}
