//! # Sync Queue Repository
//!
//! Delivery bookkeeping on top of the record store: what is pending,
//! what was delivered, what exhausted its retries.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Delivery State Machine                               │
//! │                                                                         │
//! │  queue_request / save                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────┐   mark_synced    ┌─────────┐   purge_synced (retention)   │
//! │  │ pending │ ───────────────► │ synced  │ ─────────────────► deleted   │
//! │  └────┬────┘                  └─────────┘                              │
//! │       │ record_failure                                                  │
//! │       │  retries += 1                                                   │
//! │       │  retries <  max → stays pending                                 │
//! │       │  retries >= max → failed (dead-lettered)                        │
//! │       ▼                                                                 │
//! │  ┌─────────┐   requeue (manual) → pending, retries = 0                 │
//! │  │ failed  │ ─────────────────────────────────────────────►            │
//! │  └─────────┘                                                           │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • A queued request is never removed before synced or failed           │
//! │  • Retry increments and dead-lettering happen in one statement         │
//! │  • Results land only on the row version that was sent                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use harbor_core::{Collection, IndexQuery, QueuedRequest, Record, SyncStatus};

use crate::error::{DbError, DbResult};
use crate::repository::records::{rows_into_records, PersistentStore, RecordRow, RECORD_COLUMNS};

/// Result of recording a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Retry count after this failure.
    pub retries: u32,
    /// Whether this failure exhausted the budget.
    pub dead_lettered: bool,
}

/// How a delivery result landed on the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement<T> {
    /// The record was unchanged since it was read and now carries the result.
    Applied(T),
    /// The record was re-saved while in flight and keeps its new state.
    Superseded,
    /// The record was deleted while in flight.
    Gone,
}

/// Record counts by status across drained collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
}

/// Repository for delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    fn store(&self) -> PersistentStore {
        PersistentStore::new(self.pool.clone())
    }

    /// Persists a mutating request into `form_queue`.
    ///
    /// ## Returns
    /// The queue id.
    pub async fn queue_request(&self, request: &QueuedRequest) -> DbResult<i64> {
        let key = self
            .store()
            .save(Collection::FormQueue, request.to_new_record()?)
            .await?;

        let id = key.id().ok_or_else(|| DbError::InvalidKey {
            collection: Collection::FormQueue.to_string(),
            key: key.to_string(),
        })?;

        debug!(id, url = %request.url, method = %request.method, "Queued request");
        Ok(id)
    }

    /// Pending records of one collection, oldest first.
    pub async fn pending(&self, collection: Collection) -> DbResult<Vec<Record>> {
        self.store()
            .get_all(collection, Some(&IndexQuery::sync_status(SyncStatus::Pending)))
            .await
    }

    /// Pending queued requests, oldest first.
    pub async fn pending_requests(&self) -> DbResult<Vec<QueuedRequest>> {
        self.pending(Collection::FormQueue)
            .await?
            .iter()
            .map(|record| QueuedRequest::from_record(record).map_err(DbError::from))
            .collect()
    }

    /// Marks a delivered record as synced.
    ///
    /// Applies only while the stored row still matches the snapshot the
    /// delivery was built from. A record re-saved in flight stays pending
    /// with its new payload.
    pub async fn mark_synced(&self, record: &Record) -> DbResult<Settlement<()>> {
        let result = sqlx::query(
            r#"
            UPDATE records SET
                sync_status = 'synced',
                last_error = NULL,
                updated_at = ?3
            WHERE collection = ?1 AND record_key = ?2
              AND sync_status = 'pending' AND updated_at = ?4 AND payload = ?5
            "#,
        )
        .bind(record.collection.as_str())
        .bind(record.key.to_string())
        .bind(Utc::now().timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .bind(serde_json::to_string(&record.payload)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.missed(record).await;
        }

        debug!(collection = %record.collection, key = %record.key, "Marked synced");
        Ok(Settlement::Applied(()))
    }

    /// Records a failed delivery.
    ///
    /// Increments `retries` and, when it reaches `max_retries`,
    /// dead-letters the record in the same statement. Guarded by the same
    /// snapshot check as [`mark_synced`](Self::mark_synced).
    pub async fn record_failure(
        &self,
        record: &Record,
        error: &str,
        max_retries: u32,
    ) -> DbResult<Settlement<FailureOutcome>> {
        // SET expressions read the pre-update row
        let row: Option<(i64, SyncStatus)> = sqlx::query_as(
            r#"
            UPDATE records SET
                retries = retries + 1,
                last_error = ?3,
                updated_at = ?4,
                sync_status = CASE
                    WHEN retries + 1 >= ?5 THEN 'failed'
                    ELSE sync_status
                END
            WHERE collection = ?1 AND record_key = ?2
              AND sync_status = 'pending' AND updated_at = ?6 AND payload = ?7
            RETURNING retries, sync_status
            "#,
        )
        .bind(record.collection.as_str())
        .bind(record.key.to_string())
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .bind(i64::from(max_retries))
        .bind(record.updated_at.timestamp_millis())
        .bind(serde_json::to_string(&record.payload)?)
        .fetch_optional(&self.pool)
        .await?;

        let Some((retries, status)) = row else {
            return self.missed(record).await;
        };

        let outcome = FailureOutcome {
            retries: u32::try_from(retries).unwrap_or(u32::MAX),
            dead_lettered: status == SyncStatus::Failed,
        };

        let (collection, key) = (record.collection, &record.key);
        if outcome.dead_lettered {
            warn!(collection = %collection, key = %key, retries, error, "Record dead-lettered");
        } else {
            debug!(collection = %collection, key = %key, retries, error, "Delivery failed");
        }

        Ok(Settlement::Applied(outcome))
    }

    /// Classifies a guarded update that matched no row.
    async fn missed<T>(&self, record: &Record) -> DbResult<Settlement<T>> {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM records WHERE collection = ?1 AND record_key = ?2")
                .bind(record.collection.as_str())
                .bind(record.key.to_string())
                .fetch_optional(&self.pool)
                .await?;

        if exists.is_some() {
            debug!(collection = %record.collection, key = %record.key, "Record changed in flight");
            Ok(Settlement::Superseded)
        } else {
            debug!(collection = %record.collection, key = %record.key, "Record removed in flight");
            Ok(Settlement::Gone)
        }
    }

    /// Dead-lettered records, optionally for one collection.
    pub async fn dead_letters(&self, collection: Option<Collection>) -> DbResult<Vec<Record>> {
        match collection {
            Some(collection) => {
                self.store()
                    .get_all(collection, Some(&IndexQuery::sync_status(SyncStatus::Failed)))
                    .await
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT {RECORD_COLUMNS} FROM records
                    WHERE sync_status = 'failed' AND collection != 'api_cache'
                    ORDER BY timestamp ASC, seq ASC
                    "#
                );
                let rows = sqlx::query_as::<_, RecordRow>(&sql)
                    .fetch_all(&self.pool)
                    .await?;
                rows_into_records(rows)
            }
        }
    }

    /// Moves a dead-lettered record back to pending with a fresh budget.
    pub async fn requeue(&self, collection: Collection, id: i64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE records SET
                sync_status = 'pending',
                retries = 0,
                last_error = NULL,
                updated_at = ?3
            WHERE collection = ?1 AND record_key = ?2 AND sync_status = 'failed'
            "#,
        )
        .bind(collection.as_str())
        .bind(id.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(collection.as_str(), id.to_string()));
        }

        debug!(collection = %collection, id, "Requeued dead letter");
        Ok(())
    }

    /// Counts records by status across drained collections.
    pub async fn count_by_status(&self) -> DbResult<StatusCounts> {
        let rows: Vec<(SyncStatus, i64)> = sqlx::query_as(
            r#"
            SELECT sync_status, COUNT(*)
            FROM records
            WHERE collection != 'api_cache'
            GROUP BY sync_status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status {
                SyncStatus::Pending => counts.pending = count,
                SyncStatus::Synced => counts.synced = count,
                SyncStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    /// Deletes delivered records older than `retention`.
    ///
    /// ## Returns
    /// Number of deleted records.
    pub async fn purge_synced(&self, retention: Duration) -> DbResult<u64> {
        let cutoff = (Utc::now() - retention).timestamp_millis();

        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE sync_status = 'synced'
              AND collection != 'api_cache'
              AND updated_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(removed = result.rows_affected(), "Purged synced records");
        }
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
