//! # Response Cache Repository
//!
//! `api_cache` entries keyed by request URL. Staleness is decided on
//! read: an expired entry is deleted by the read that finds it.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use harbor_core::{CacheEntry, Collection, RecordKey};

use crate::error::DbResult;
use crate::repository::records::PersistentStore;

#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    fn store(&self) -> PersistentStore {
        PersistentStore::new(self.pool.clone())
    }

    /// Stores or replaces the entry for `entry.url`.
    pub async fn put(&self, entry: &CacheEntry) -> DbResult<()> {
        self.store()
            .save(Collection::ApiCache, entry.to_new_record()?)
            .await?;
        debug!(url = %entry.url, tier = entry.tier.as_str(), status = entry.status, "Cached response");
        Ok(())
    }

    /// Returns the entry regardless of age.
    pub async fn get(&self, key: &str) -> DbResult<Option<CacheEntry>> {
        let record = self
            .store()
            .get(Collection::ApiCache, &RecordKey::Url(key.to_string()))
            .await?;

        match record {
            Some(record) => Ok(Some(CacheEntry::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Returns the entry if it is still fresh under `ttl`.
    ///
    /// A stale entry is deleted and reported as absent.
    pub async fn get_fresh(&self, key: &str, ttl: Option<Duration>) -> DbResult<Option<CacheEntry>> {
        let Some(entry) = self.get(key).await? else {
            return Ok(None);
        };

        if entry.is_fresh(Utc::now(), ttl) {
            return Ok(Some(entry));
        }

        debug!(url = %key, age_secs = entry.age(Utc::now()).num_seconds(), "Evicting stale cache entry");
        self.delete(key).await?;
        Ok(None)
    }

    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        self.store()
            .delete(Collection::ApiCache, &RecordKey::Url(key.to_string()))
            .await
    }

    /// Drops every cached response.
    pub async fn clear(&self) -> DbResult<u64> {
        self.store().clear(Collection::ApiCache).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use harbor_core::{CacheTier, HttpMethod};

    fn entry(url: &str, age: Duration) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: HttpMethod::Get,
            status: 200,
            content_type: Some("application/json".into()),
            body: br#"{"stock":5}"#.to_vec(),
            stored_at: Utc::now() - age,
            tier: CacheTier::Api,
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cache = db.cache();

        cache.put(&entry("/api/inventory/42/", Duration::zero())).await.unwrap();

        let hit = cache.get("/api/inventory/42/").await.unwrap().unwrap();
        assert_eq!(hit.body, br#"{"stock":5}"#.to_vec());
        assert!(cache.get("/api/inventory/99/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cache = db.cache();

        cache.put(&entry("/api/a/", Duration::zero())).await.unwrap();
        let mut newer = entry("/api/a/", Duration::zero());
        newer.body = b"[]".to_vec();
        cache.put(&newer).await.unwrap();

        assert_eq!(cache.get("/api/a/").await.unwrap().unwrap().body, b"[]".to_vec());
        assert_eq!(db.records().get_all(Collection::ApiCache, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_is_deleted_on_read() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cache = db.cache();

        cache.put(&entry("/api/old/", Duration::hours(2))).await.unwrap();
        cache.put(&entry("/api/new/", Duration::minutes(10))).await.unwrap();

        let ttl = Some(Duration::hours(1));
        assert!(cache.get_fresh("/api/old/", ttl).await.unwrap().is_none());
        assert!(cache.get("/api/old/").await.unwrap().is_none());
        assert!(cache.get_fresh("/api/new/", ttl).await.unwrap().is_some());
    }
}
