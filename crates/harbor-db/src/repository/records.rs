//! # Persistent Store
//!
//! Generic keyed record storage for the six collections.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  records                                                                │
//! │                                                                         │
//! │  collection | record_key          | seq | payload | sync_status | ts   │
//! │  ───────────┼─────────────────────┼─────┼─────────┼─────────────┼───── │
//! │  orders     │ 1                   │ 1   │ {...}   │ pending     │ ...  │
//! │  form_queue │ 1                   │ 1   │ {url..} │ pending     │ ...  │
//! │  api_cache  │ /api/inventory/42/  │ 3   │ {body}  │ synced      │ ...  │
//! │                                                                         │
//! │  collection_sequences: last_seq per collection, never decremented      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation is atomic for one record; there are no multi-record
//! transactions. `get_all` orders by `timestamp`, then by `seq`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::query::QueryAs;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use harbor_core::{Collection, IndexQuery, NewRecord, Record, RecordKey, SyncStatus};

use crate::error::{DbError, DbResult};

pub(crate) const RECORD_COLUMNS: &str =
    "collection, record_key, payload, sync_status, timestamp, retries, last_error, updated_at";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct RecordRow {
    collection: Collection,
    record_key: String,
    payload: String,
    sync_status: SyncStatus,
    timestamp: i64,
    retries: i64,
    last_error: Option<String>,
    updated_at: i64,
}

impl RecordRow {
    pub(crate) fn into_record(self) -> DbResult<Record> {
        Ok(Record {
            key: RecordKey::parse(self.collection, &self.record_key)?,
            collection: self.collection,
            payload: serde_json::from_str(&self.payload)?,
            sync_status: self.sync_status,
            timestamp: from_millis(self.timestamp)?,
            retries: u32::try_from(self.retries).unwrap_or(0),
            last_error: self.last_error,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

pub(crate) fn from_millis(ms: i64) -> DbResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Serialization(format!("timestamp out of range: {ms}")))
}

pub(crate) fn rows_into_records(rows: Vec<RecordRow>) -> DbResult<Vec<Record>> {
    rows.into_iter().map(RecordRow::into_record).collect()
}

/// SQL value for an index filter.
enum FilterValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl FilterValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FilterValue::Null,
            // json_extract yields 1 / 0 for booleans
            Value::Bool(b) => FilterValue::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FilterValue::Int(i),
                None => FilterValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FilterValue::Text(s.clone()),
            other => FilterValue::Text(other.to_string()),
        }
    }

    /// `timestamp` filters accept epoch millis or RFC 3339 text.
    fn timestamp(value: &Value) -> DbResult<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(FilterValue::Int)
                .ok_or_else(|| DbError::Serialization(format!("invalid timestamp: {n}"))),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| FilterValue::Int(dt.timestamp_millis()))
                .map_err(|e| DbError::Serialization(e.to_string())),
            other => Err(DbError::Serialization(format!("invalid timestamp: {other}"))),
        }
    }

    fn bind<'q>(
        self,
        query: QueryAs<'q, Sqlite, RecordRow, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, RecordRow, SqliteArguments<'q>> {
        match self {
            FilterValue::Null => query,
            FilterValue::Int(i) => query.bind(i),
            FilterValue::Real(f) => query.bind(f),
            FilterValue::Text(s) => query.bind(s),
        }
    }
}

/// Size of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSize {
    pub collection: Collection,
    pub records: u64,
    /// Sum of serialized payload lengths.
    pub bytes: u64,
}

// =============================================================================
// Persistent Store
// =============================================================================

/// Keyed record storage over the six collections.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    pool: SqlitePool,
}

impl PersistentStore {
    pub fn new(pool: SqlitePool) -> Self {
        PersistentStore { pool }
    }

    /// Inserts or replaces a record.
    ///
    /// ## What This Does
    /// - Keyless records get the collection's next id
    /// - Explicit ids advance the sequence so they are never handed out again
    /// - Missing `sync_status` becomes `pending`, missing `timestamp` becomes now
    /// - An existing record with the same key is replaced wholesale
    ///
    /// ## Returns
    /// The record's key.
    pub async fn save(&self, collection: Collection, record: NewRecord) -> DbResult<RecordKey> {
        let now = Utc::now();
        let timestamp = record.timestamp.unwrap_or(now);
        let status = record.sync_status.unwrap_or_default();
        let payload = serde_json::to_string(&record.payload)?;

        let mut tx = self.pool.begin().await?;

        let (key, seq) = match (collection.is_url_keyed(), record.key) {
            (true, Some(RecordKey::Url(url))) => {
                let seq = next_seq(&mut tx, collection).await?;
                (RecordKey::Url(url), seq)
            }
            (true, None) => {
                return Err(DbError::MissingKey {
                    collection: collection.to_string(),
                })
            }
            (false, None) => {
                let seq = next_seq(&mut tx, collection).await?;
                (RecordKey::Id(seq), seq)
            }
            (false, Some(RecordKey::Id(id))) if id > 0 => {
                sqlx::query(
                    "UPDATE collection_sequences SET last_seq = MAX(last_seq, ?1) WHERE collection = ?2",
                )
                .bind(id)
                .bind(collection.as_str())
                .execute(&mut *tx)
                .await?;
                (RecordKey::Id(id), id)
            }
            (_, Some(other)) => {
                return Err(DbError::InvalidKey {
                    collection: collection.to_string(),
                    key: other.to_string(),
                })
            }
        };

        sqlx::query(
            r#"
            INSERT INTO records (
                collection, record_key, seq, payload, sync_status,
                timestamp, retries, last_error, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)
            ON CONFLICT (collection, record_key) DO UPDATE SET
                payload = excluded.payload,
                sync_status = excluded.sync_status,
                timestamp = excluded.timestamp,
                retries = excluded.retries,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection.as_str())
        .bind(key.to_string())
        .bind(seq)
        .bind(payload)
        .bind(status.as_str())
        .bind(timestamp.timestamp_millis())
        .bind(i64::from(record.retries))
        .bind(now.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(collection = %collection, key = %key, status = %status, "Saved record");
        Ok(key)
    }

    /// Fetches one record.
    pub async fn get(&self, collection: Collection, key: &RecordKey) -> DbResult<Option<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE collection = ?1 AND record_key = ?2"
        );

        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(collection.as_str())
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(RecordRow::into_record).transpose()
    }

    /// Lists a collection, optionally filtered by a declared index.
    ///
    /// ## Arguments
    /// * `query` - `None` for the whole collection
    ///
    /// ## Errors
    /// `DbError::UnknownIndex` if the index is not declared for `collection`.
    pub async fn get_all(
        &self,
        collection: Collection,
        query: Option<&IndexQuery>,
    ) -> DbResult<Vec<Record>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE collection = ?1");
        let mut filter = None;

        if let Some(query) = query {
            let index = collection.index(&query.index)?;
            let (expr, value) = match index {
                "sync_status" => ("sync_status".to_string(), FilterValue::from_json(&query.value)),
                "timestamp" => ("timestamp".to_string(), FilterValue::timestamp(&query.value)?),
                field => (
                    format!("json_extract(payload, '$.{field}')"),
                    FilterValue::from_json(&query.value),
                ),
            };

            if matches!(value, FilterValue::Null) {
                sql.push_str(&format!(" AND {expr} IS NULL"));
            } else {
                sql.push_str(&format!(" AND {expr} = ?2"));
            }
            filter = Some(value);
        }

        sql.push_str(" ORDER BY timestamp ASC, seq ASC");

        let mut statement = sqlx::query_as::<_, RecordRow>(&sql).bind(collection.as_str());
        if let Some(value) = filter {
            statement = value.bind(statement);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        rows_into_records(rows)
    }

    /// Deletes one record. Returns whether it existed.
    pub async fn delete(&self, collection: Collection, key: &RecordKey) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?1 AND record_key = ?2")
            .bind(collection.as_str())
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;

        debug!(collection = %collection, key = %key, "Deleted record");
        Ok(result.rows_affected() > 0)
    }

    /// Removes every record of a collection. Ids are not reset.
    pub async fn clear(&self, collection: Collection) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?1")
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;

        debug!(collection = %collection, removed = result.rows_affected(), "Cleared collection");
        Ok(result.rows_affected())
    }

    /// Record counts and payload bytes, per collection.
    pub async fn size(&self) -> DbResult<Vec<CollectionSize>> {
        let rows: Vec<(Collection, i64, i64)> = sqlx::query_as(
            r#"
            SELECT collection, COUNT(*), COALESCE(SUM(LENGTH(payload)), 0)
            FROM records
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(collection, records, bytes)| CollectionSize {
                collection,
                records: records.max(0) as u64,
                bytes: bytes.max(0) as u64,
            })
            .collect())
    }
}

/// Allocates the next id of `collection` inside the caller's transaction.
async fn next_seq(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    collection: Collection,
) -> DbResult<i64> {
    let seq: i64 = sqlx::query_scalar(
        "UPDATE collection_sequences SET last_seq = last_seq + 1 WHERE collection = ?1 RETURNING last_seq",
    )
    .bind(collection.as_str())
    .fetch_one(&mut **tx)
    .await?;

    Ok(seq)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use serde_json::json;

    async fn store() -> PersistentStore {
        Database::new(DbConfig::in_memory()).await.unwrap().records()
    }

    #[tokio::test]
    async fn test_save_assigns_defaults() {
        let store = store().await;

        let key = store
            .save(Collection::Orders, NewRecord::new(json!({"order_identifier": "ORD-1"})))
            .await
            .unwrap();
        assert_eq!(key, RecordKey::Id(1));

        let record = store.get(Collection::Orders, &key).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.retries, 0);
        assert_eq!(record.payload["order_identifier"], "ORD-1");
    }

    #[tokio::test]
    async fn test_save_upserts_by_key() {
        let store = store().await;

        let key = store
            .save(Collection::Customers, NewRecord::new(json!({"phone": "555-0100"})))
            .await
            .unwrap();
        store
            .save(
                Collection::Customers,
                NewRecord::new(json!({"phone": "555-0199"})).with_key(key.clone()),
            )
            .await
            .unwrap();

        let all = store.get_all(Collection::Customers, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload["phone"], "555-0199");
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let store = store().await;

        let first = store
            .save(Collection::Products, NewRecord::new(json!({"name": "Tea"})))
            .await
            .unwrap();
        store.delete(Collection::Products, &first).await.unwrap();
        store.clear(Collection::Products).await.unwrap();

        let second = store
            .save(Collection::Products, NewRecord::new(json!({"name": "Coffee"})))
            .await
            .unwrap();
        assert_eq!(second, RecordKey::Id(2));

        // An explicit id pushes the sequence past it
        store
            .save(Collection::Products, NewRecord::new(json!({})).with_key(10_i64))
            .await
            .unwrap();
        let next = store
            .save(Collection::Products, NewRecord::new(json!({})))
            .await
            .unwrap();
        assert_eq!(next, RecordKey::Id(11));
    }

    #[tokio::test]
    async fn test_ids_are_per_collection() {
        let store = store().await;

        let order = store.save(Collection::Orders, NewRecord::new(json!({}))).await.unwrap();
        let customer = store.save(Collection::Customers, NewRecord::new(json!({}))).await.unwrap();
        assert_eq!(order, RecordKey::Id(1));
        assert_eq!(customer, RecordKey::Id(1));
    }

    #[tokio::test]
    async fn test_get_all_orders_by_timestamp() {
        let store = store().await;
        let now = Utc::now();

        store
            .save(Collection::Orders, NewRecord::new(json!({"n": "late"})).with_timestamp(now))
            .await
            .unwrap();
        store
            .save(
                Collection::Orders,
                NewRecord::new(json!({"n": "early"})).with_timestamp(now - Duration::minutes(5)),
            )
            .await
            .unwrap();

        let all = store.get_all(Collection::Orders, None).await.unwrap();
        assert_eq!(all[0].payload["n"], "early");
        assert_eq!(all[1].payload["n"], "late");
    }

    #[tokio::test]
    async fn test_get_all_by_index() {
        let store = store().await;

        store
            .save(Collection::Inventory, NewRecord::new(json!({"product_id": 42, "qty": 1})))
            .await
            .unwrap();
        store
            .save(Collection::Inventory, NewRecord::new(json!({"product_id": 7, "qty": 2})))
            .await
            .unwrap();
        store
            .save(
                Collection::Inventory,
                NewRecord::new(json!({"product_id": 42, "qty": 3})).with_status(SyncStatus::Synced),
            )
            .await
            .unwrap();

        let by_product = store
            .get_all(Collection::Inventory, Some(&IndexQuery::new("product_id", 42)))
            .await
            .unwrap();
        assert_eq!(by_product.len(), 2);

        let pending = store
            .get_all(Collection::Inventory, Some(&IndexQuery::sync_status(SyncStatus::Pending)))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|r| r.sync_status == SyncStatus::Pending));
    }

    #[tokio::test]
    async fn test_undeclared_index_is_an_error() {
        let store = store().await;

        let err = store
            .get_all(Collection::Orders, Some(&IndexQuery::new("phone", "555")))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UnknownIndex { .. }));
    }

    #[tokio::test]
    async fn test_api_cache_requires_url_key() {
        let store = store().await;

        let err = store
            .save(Collection::ApiCache, NewRecord::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MissingKey { .. }));

        let err = store
            .save(Collection::Orders, NewRecord::new(json!({})).with_key(RecordKey::Url("/x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = store().await;

        let key = store.save(Collection::Orders, NewRecord::new(json!({}))).await.unwrap();
        store.save(Collection::Orders, NewRecord::new(json!({}))).await.unwrap();

        assert!(store.delete(Collection::Orders, &key).await.unwrap());
        assert!(!store.delete(Collection::Orders, &key).await.unwrap());
        assert!(store.get(Collection::Orders, &key).await.unwrap().is_none());

        assert_eq!(store.clear(Collection::Orders).await.unwrap(), 1);
        assert!(store.get_all(Collection::Orders, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_reports_per_collection() {
        let store = store().await;

        store.save(Collection::Orders, NewRecord::new(json!({"a": 1}))).await.unwrap();
        store.save(Collection::Orders, NewRecord::new(json!({"a": 2}))).await.unwrap();

        let sizes = store.size().await.unwrap();
        let orders = sizes.iter().find(|s| s.collection == Collection::Orders).unwrap();
        assert_eq!(orders.records, 2);
        assert_eq!(orders.bytes, 14); // {"a":1} twice
    }
}
