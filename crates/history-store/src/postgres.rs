use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    HistoryEvent, HistoryRecord, HistoryStoreError, InstanceId, Result, SequenceNo,
    WorkflowInstance,
    store::{AppendGuard, AppendOptions, HistoryStore},
};

const TERMINAL_STATUSES: &str = "('Completed', 'Failed', 'Terminated')";

/// PostgreSQL-backed history store.
///
/// Appends run in one transaction that first locks the instance row, so
/// concurrent writers to the same instance are serialized and the append
/// rules are checked against the latest history.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Creates a new PostgreSQL history store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<HistoryRecord> {
        let raw_id: String = row.try_get("instance_id")?;
        let instance_id = InstanceId::parse(raw_id).map_err(|e| HistoryStoreError::Corrupt {
            instance_id: InstanceId::default(),
            reason: e.to_string(),
        })?;
        let payload: serde_json::Value = row.try_get("payload")?;

        Ok(HistoryRecord {
            instance_id,
            sequence_no: SequenceNo::new(row.try_get("sequence_no")?),
            kind: row.try_get("kind")?,
            payload: serde_json::from_value(payload)?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    async fn read_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        instance_id: &InstanceId,
    ) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT instance_id, sequence_no, kind, payload, timestamp
            FROM orchestration_history
            WHERE instance_id = $1
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(instance_id.as_str())
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn insert_record(
        tx: &mut Transaction<'_, Postgres>,
        record: &HistoryRecord,
    ) -> Result<()> {
        let payload = serde_json::to_value(&record.payload)?;

        sqlx::query(
            r#"
            INSERT INTO orchestration_history (instance_id, sequence_no, kind, payload, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.instance_id.as_str())
        .bind(record.sequence_no.as_i64())
        .bind(&record.kind)
        .bind(payload)
        .bind(record.timestamp)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            // Check if this is a unique constraint violation (concurrent writer)
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_instance_sequence")
            {
                return HistoryStoreError::ConcurrencyConflict {
                    instance_id: record.instance_id.clone(),
                    expected: SequenceNo::new(record.sequence_no.as_i64() - 1),
                    actual: record.sequence_no,
                };
            }
            HistoryStoreError::Database(e)
        })?;

        Ok(())
    }

    async fn list_ids(&self, sql: &str) -> Result<Vec<InstanceId>> {
        let ids: Vec<String> = sqlx::query_scalar(sql).fetch_all(&self.pool).await?;
        ids.into_iter()
            .map(|raw| {
                InstanceId::parse(raw).map_err(|e| HistoryStoreError::Corrupt {
                    instance_id: InstanceId::default(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn create_instance(
        &self,
        instance_id: &InstanceId,
        orchestration: &str,
        input: serde_json::Value,
    ) -> Result<SequenceNo> {
        let record = HistoryRecord::new(
            instance_id.clone(),
            SequenceNo::first(),
            HistoryEvent::instance_created(orchestration, input),
        );

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orchestration_instances
                (instance_id, orchestration, status, last_sequence, last_wake_sequence, consumed_through, created_at, updated_at)
            VALUES ($1, $2, 'Pending', $3, $3, 0, $4, $4)
            ON CONFLICT (instance_id) DO NOTHING
            "#,
        )
        .bind(instance_id.as_str())
        .bind(orchestration)
        .bind(record.sequence_no.as_i64())
        .bind(record.timestamp)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(HistoryStoreError::InstanceAlreadyExists(
                instance_id.clone(),
            ));
        }

        Self::insert_record(&mut tx, &record).await?;
        tx.commit().await?;

        tracing::debug!(%instance_id, orchestration, "instance created");
        Ok(record.sequence_no)
    }

    async fn append(
        &self,
        instance_id: &InstanceId,
        events: Vec<HistoryEvent>,
        options: AppendOptions,
    ) -> Result<SequenceNo> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<String> = sqlx::query_scalar(
            "SELECT instance_id FROM orchestration_instances WHERE instance_id = $1 FOR UPDATE",
        )
        .bind(instance_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            return Err(HistoryStoreError::InstanceNotFound(instance_id.clone()));
        }

        let mut records = Self::read_in_tx(&mut tx, instance_id).await?;
        let mut guard = AppendGuard::from_records(instance_id.clone(), &records);
        guard.check(&events, &options)?;

        let mut last_wake = None;
        for event in events {
            let sequence_no = guard.last_sequence().next();
            if event.is_wake() {
                last_wake = Some(sequence_no);
            }
            guard.observe(sequence_no, &event);

            let record = HistoryRecord::new(instance_id.clone(), sequence_no, event);
            Self::insert_record(&mut tx, &record).await?;
            records.push(record);
        }

        let status = WorkflowInstance::from_history(&records)?
            .map(|instance| instance.status)
            .ok_or_else(|| HistoryStoreError::InstanceNotFound(instance_id.clone()))?;
        let last_sequence = guard.last_sequence();

        sqlx::query(
            r#"
            UPDATE orchestration_instances
            SET status = $2,
                last_sequence = $3,
                last_wake_sequence = COALESCE($4, last_wake_sequence),
                updated_at = $5
            WHERE instance_id = $1
            "#,
        )
        .bind(instance_id.as_str())
        .bind(status.as_str())
        .bind(last_sequence.as_i64())
        .bind(last_wake.map(|s: SequenceNo| s.as_i64()))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(last_sequence)
    }

    async fn read_all(&self, instance_id: &InstanceId) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT instance_id, sequence_no, kind, payload, timestamp
            FROM orchestration_history
            WHERE instance_id = $1
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(instance_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn list_runnable(&self) -> Result<Vec<InstanceId>> {
        self.list_ids(&format!(
            "SELECT instance_id FROM orchestration_instances \
             WHERE status NOT IN {TERMINAL_STATUSES} AND last_wake_sequence > consumed_through \
             ORDER BY instance_id"
        ))
        .await
    }

    async fn list_active(&self) -> Result<Vec<InstanceId>> {
        self.list_ids(&format!(
            "SELECT instance_id FROM orchestration_instances \
             WHERE status NOT IN {TERMINAL_STATUSES} \
             ORDER BY instance_id"
        ))
        .await
    }

    async fn mark_consumed(&self, instance_id: &InstanceId, through: SequenceNo) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE orchestration_instances
            SET consumed_through = GREATEST(consumed_through, $2)
            WHERE instance_id = $1
            "#,
        )
        .bind(instance_id.as_str())
        .bind(through.as_i64())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(HistoryStoreError::InstanceNotFound(instance_id.clone()));
        }
        Ok(())
    }
}
