use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    HistoryEvent, HistoryRecord, HistoryStoreError, InstanceId, Result, SequenceNo,
    store::{AppendGuard, AppendOptions, HistoryStore},
};

#[derive(Debug)]
struct InstanceLog {
    records: Vec<HistoryRecord>,
    guard: AppendGuard,
    consumed_through: SequenceNo,
    last_wake: SequenceNo,
}

impl InstanceLog {
    fn push(&mut self, instance_id: &InstanceId, event: HistoryEvent) -> SequenceNo {
        let sequence_no = self.guard.last_sequence().next();
        if event.is_wake() {
            self.last_wake = sequence_no;
        }
        self.guard.observe(sequence_no, &event);
        self.records
            .push(HistoryRecord::new(instance_id.clone(), sequence_no, event));
        sequence_no
    }

    fn is_runnable(&self) -> bool {
        !self.guard.is_terminal() && self.last_wake > self.consumed_through
    }
}

/// In-memory history store for tests and single-process deployments.
///
/// Provides the same guarantees as the PostgreSQL implementation: a batch is
/// validated and written under one write lock, so readers never see a
/// partial append.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    instances: Arc<RwLock<HashMap<InstanceId, InstanceLog>>>,
}

impl InMemoryHistoryStore {
    /// Creates a new empty in-memory history store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of instances stored.
    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Returns the total number of events stored across all instances.
    pub async fn event_count(&self) -> usize {
        self.instances
            .read()
            .await
            .values()
            .map(|log| log.records.len())
            .sum()
    }

    /// Clears all instances.
    pub async fn clear(&self) {
        self.instances.write().await.clear();
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_instance(
        &self,
        instance_id: &InstanceId,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<SequenceNo> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(instance_id) {
            return Err(HistoryStoreError::InstanceAlreadyExists(
                instance_id.clone(),
            ));
        }

        let mut log = InstanceLog {
            records: Vec::new(),
            guard: AppendGuard::new(instance_id.clone()),
            consumed_through: SequenceNo::initial(),
            last_wake: SequenceNo::initial(),
        };
        let sequence_no = log.push(
            instance_id,
            HistoryEvent::instance_created(orchestration, input),
        );
        instances.insert(instance_id.clone(), log);

        Ok(sequence_no)
    }

    async fn append(
        &self,
        instance_id: &InstanceId,
        events: Vec<HistoryEvent>,
        options: AppendOptions,
    ) -> Result<SequenceNo> {
        let mut instances = self.instances.write().await;
        let log = instances
            .get_mut(instance_id)
            .ok_or_else(|| HistoryStoreError::InstanceNotFound(instance_id.clone()))?;

        log.guard.check(&events, &options)?;

        let mut last = log.guard.last_sequence();
        for event in events {
            last = log.push(instance_id, event);
        }
        Ok(last)
    }

    async fn read_all(&self, instance_id: &InstanceId) -> Result<Vec<HistoryRecord>> {
        let instances = self.instances.read().await;
        Ok(instances
            .get(instance_id)
            .map(|log| log.records.clone())
            .unwrap_or_default())
    }

    async fn list_runnable(&self) -> Result<Vec<InstanceId>> {
        let instances = self.instances.read().await;
        let mut ids: Vec<_> = instances
            .iter()
            .filter(|(_, log)| log.is_runnable())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_active(&self) -> Result<Vec<InstanceId>> {
        let instances = self.instances.read().await;
        let mut ids: Vec<_> = instances
            .iter()
            .filter(|(_, log)| !log.guard.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn mark_consumed(&self, instance_id: &InstanceId, through: SequenceNo) -> Result<()> {
        let mut instances = self.instances.write().await;
        let log = instances
            .get_mut(instance_id)
            .ok_or_else(|| HistoryStoreError::InstanceNotFound(instance_id.clone()))?;
        log.consumed_through = log.consumed_through.max(through);
        Ok(())
    }
}
