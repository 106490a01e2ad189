//! # Domain Types
//!
//! Core record types shared by the store, the interceptor and the
//! sync coordinator.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   NewRecord     │   │     Record      │   │  QueuedRequest  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  key?           │──►│  key            │──►│  url, method    │       │
//! │  │  payload        │   │  payload        │   │  headers, body  │       │
//! │  │  sync_status?   │   │  sync_status    │   │  (form_queue)   │       │
//! │  │  timestamp?     │   │  timestamp      │   └─────────────────┘       │
//! │  └─────────────────┘   │  retries        │                              │
//! │                        └────────┬────────┘   ┌─────────────────┐       │
//! │                                 └───────────►│   CacheEntry    │       │
//! │                                              │  (api_cache)    │       │
//! │  ┌─────────────────┐   ┌─────────────────┐   └─────────────────┘       │
//! │  │   Collection    │   │   SyncStatus    │                              │
//! │  │  orders         │   │  Pending        │                              │
//! │  │  customers      │   │  Synced         │                              │
//! │  │  products       │   │  Failed (dead)  │                              │
//! │  │  inventory      │   └─────────────────┘                              │
//! │  │  form_queue     │                                                    │
//! │  │  api_cache      │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Keys
//! Every collection is keyed by a store-assigned integer id except
//! `api_cache`, which is keyed by the request URL.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Collection
// =============================================================================

/// One of the six logical stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Orders,
    Customers,
    Products,
    Inventory,
    /// Mutating requests captured while offline.
    FormQueue,
    /// Last good responses, keyed by URL.
    ApiCache,
}

impl Collection {
    /// Every collection, in declaration order.
    pub const ALL: [Collection; 6] = [
        Collection::Orders,
        Collection::Customers,
        Collection::Products,
        Collection::Inventory,
        Collection::FormQueue,
        Collection::ApiCache,
    ];

    /// The order in which a drain visits collections.
    ///
    /// Queued raw requests go first: they usually carry the writes the
    /// user made most recently through the normal UI path.
    pub const DRAIN_ORDER: [Collection; 5] = [
        Collection::FormQueue,
        Collection::Orders,
        Collection::Customers,
        Collection::Products,
        Collection::Inventory,
    ];

    /// Stable lowercase name, as persisted.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Orders => "orders",
            Collection::Customers => "customers",
            Collection::Products => "products",
            Collection::Inventory => "inventory",
            Collection::FormQueue => "form_queue",
            Collection::ApiCache => "api_cache",
        }
    }

    /// Secondary indexes declared for this collection.
    ///
    /// `sync_status` and `timestamp` are record columns; every other name
    /// is a top-level field of the payload.
    pub const fn indexes(&self) -> &'static [&'static str] {
        match self {
            Collection::Orders => &["order_identifier", "status", "sync_status", "created_at"],
            Collection::Customers => &["phone", "email", "sync_status"],
            Collection::Products => &["name", "product_type", "sync_status"],
            Collection::Inventory => &["product_id", "sync_status"],
            Collection::FormQueue => &["url", "timestamp", "sync_status"],
            Collection::ApiCache => &["timestamp"],
        }
    }

    /// Looks up a declared index by name.
    ///
    /// ## Returns
    /// The `'static` index name, so callers never splice caller-provided
    /// text into SQL.
    pub fn index(&self, name: &str) -> CoreResult<&'static str> {
        self.indexes()
            .iter()
            .copied()
            .find(|declared| *declared == name)
            .ok_or_else(|| CoreError::UnknownIndex {
                collection: self.as_str().to_string(),
                index: name.to_string(),
            })
    }

    /// Whether records are keyed by URL rather than integer id.
    pub const fn is_url_keyed(&self) -> bool {
        matches!(self, Collection::ApiCache)
    }

    /// Whether the coordinator drains this collection.
    pub const fn is_drained(&self) -> bool {
        !matches!(self, Collection::ApiCache)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCollection(s.to_string()))
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Delivery state of a record.
///
/// ```text
/// pending ──(2xx)──► synced
///    │ ▲
///    │ └──(non-2xx, retries < max)
///    └────(non-2xx, retries = max)──► failed (dead-lettered)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    /// Retry budget exhausted; excluded from automatic drains.
    Failed,
}

impl SyncStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Pending
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(CoreError::InvalidSyncStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Record Key
// =============================================================================

/// Primary key of a record within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum RecordKey {
    Id(i64),
    Url(String),
}

impl RecordKey {
    /// Parses the persisted text form for the given collection.
    pub fn parse(collection: Collection, raw: &str) -> CoreResult<Self> {
        if collection.is_url_keyed() {
            return Ok(RecordKey::Url(raw.to_string()));
        }
        raw.parse::<i64>()
            .map(RecordKey::Id)
            .map_err(|_| CoreError::malformed(collection.as_str(), format!("non-numeric key '{raw}'")))
    }

    /// Integer id, if this is an id key.
    pub fn id(&self) -> Option<i64> {
        match self {
            RecordKey::Id(id) => Some(*id),
            RecordKey::Url(_) => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "{id}"),
            RecordKey::Url(url) => f.write_str(url),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        RecordKey::Id(id)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A record about to be saved.
///
/// Absent fields are filled in by the store: a fresh id from the
/// collection's sequence, `sync_status = pending`, `timestamp = now`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewRecord {
    pub key: Option<RecordKey>,
    #[ts(type = "unknown")]
    pub payload: Value,
    pub sync_status: Option<SyncStatus>,
    #[ts(as = "Option<String>")]
    pub timestamp: Option<DateTime<Utc>>,
    pub retries: u32,
}

impl NewRecord {
    /// A keyless pending record carrying `payload`.
    pub fn new(payload: Value) -> Self {
        NewRecord {
            key: None,
            payload,
            sync_status: None,
            timestamp: None,
            retries: 0,
        }
    }

    pub fn with_key(mut self, key: impl Into<RecordKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A record as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Record {
    pub collection: Collection,
    pub key: RecordKey,
    #[ts(type = "unknown")]
    pub payload: Value,
    pub sync_status: SyncStatus,
    /// Creation time; drains visit records oldest first.
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    /// Failed delivery attempts. Reset only by a manual requeue.
    pub retries: u32,
    /// Reason for the last failed delivery.
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Integer id, for every collection except `api_cache`.
    pub fn id(&self) -> Option<i64> {
        self.key.id()
    }
}

/// Filter for `get_all` over a declared secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IndexQuery {
    pub index: String,
    #[ts(type = "unknown")]
    pub value: Value,
}

impl IndexQuery {
    pub fn new(index: impl Into<String>, value: impl Into<Value>) -> Self {
        IndexQuery {
            index: index.into(),
            value: value.into(),
        }
    }

    /// Shorthand for the most common query.
    pub fn sync_status(status: SyncStatus) -> Self {
        IndexQuery::new("sync_status", status.as_str())
    }
}

// =============================================================================
// HTTP Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Mutating methods are queued when they cannot be delivered.
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete
        )
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(CoreError::InvalidMethod(s.to_string())),
        }
    }
}

// =============================================================================
// Queued Request
// =============================================================================

/// A mutating request captured while it could not reach the network.
///
/// Stored in `form_queue`. The payload holds `url`, `method`, `headers`
/// and `body`; `timestamp` and `retries` live on the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueuedRequest {
    /// Store id, once persisted.
    pub id: Option<i64>,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub retries: u32,
    pub sync_status: SyncStatus,
}

/// On-disk shape of a queued request's payload.
#[derive(Serialize, Deserialize)]
struct QueuedPayload {
    url: String,
    method: HttpMethod,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

impl QueuedRequest {
    /// Creates an unsaved pending request stamped with the current time.
    pub fn new(
        url: impl Into<String>,
        method: HttpMethod,
        headers: BTreeMap<String, String>,
        body: Option<String>,
    ) -> Self {
        QueuedRequest {
            id: None,
            url: url.into(),
            method,
            headers,
            body,
            timestamp: Utc::now(),
            retries: 0,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Converts to a record ready for `form_queue`.
    pub fn to_new_record(&self) -> CoreResult<NewRecord> {
        let payload = serde_json::to_value(QueuedPayload {
            url: self.url.clone(),
            method: self.method,
            headers: self.headers.clone(),
            body: self.body.clone(),
        })?;

        Ok(NewRecord {
            key: self.id.map(RecordKey::Id),
            payload,
            sync_status: Some(self.sync_status),
            timestamp: Some(self.timestamp),
            retries: self.retries,
        })
    }

    /// Rebuilds a queued request from a `form_queue` record.
    pub fn from_record(record: &Record) -> CoreResult<Self> {
        if record.collection != Collection::FormQueue {
            return Err(CoreError::malformed(
                record.collection.as_str(),
                "not a form_queue record",
            ));
        }

        let payload: QueuedPayload = serde_json::from_value(record.payload.clone())
            .map_err(|e| CoreError::malformed(Collection::FormQueue.as_str(), e.to_string()))?;

        Ok(QueuedRequest {
            id: record.id(),
            url: payload.url,
            method: payload.method,
            headers: payload.headers,
            body: payload.body,
            timestamp: record.timestamp,
            retries: record.retries,
            sync_status: record.sync_status,
        })
    }

    /// Parses the body as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// Cache tier a response was stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Static,
    Images,
    Api,
    Pages,
    Dynamic,
}

impl CacheTier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Static => "static",
            CacheTier::Images => "images",
            CacheTier::Api => "api",
            CacheTier::Pages => "pages",
            CacheTier::Dynamic => "dynamic",
        }
    }
}

/// Last good response for a URL.
///
/// Freshness is decided when the entry is read, never by a sweeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CacheEntry {
    /// Cache key, see [`CacheEntry::key_for`].
    pub url: String,
    pub method: HttpMethod,
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(with = "body_base64")]
    #[ts(type = "string")]
    pub body: Vec<u8>,
    #[ts(as = "String")]
    pub stored_at: DateTime<Utc>,
    pub tier: CacheTier,
}

impl CacheEntry {
    /// Cache key for a read: the URL for GET, `"<METHOD> <url>"` otherwise.
    pub fn key_for(method: HttpMethod, url: &str) -> String {
        match method {
            HttpMethod::Get => url.to_string(),
            other => format!("{} {}", other.as_str(), url),
        }
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.stored_at)
    }

    /// Whether the entry is still usable at `now`.
    ///
    /// ## Arguments
    /// * `ttl` - `None` means the tier never expires
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.age(now) <= ttl,
            None => true,
        }
    }

    /// Converts to a record for `api_cache`.
    pub fn to_new_record(&self) -> CoreResult<NewRecord> {
        Ok(NewRecord {
            key: Some(RecordKey::Url(self.url.clone())),
            payload: serde_json::to_value(self)?,
            sync_status: Some(SyncStatus::Synced),
            timestamp: Some(self.stored_at),
            retries: 0,
        })
    }

    /// Rebuilds a cache entry from an `api_cache` record.
    pub fn from_record(record: &Record) -> CoreResult<Self> {
        serde_json::from_value(record.payload.clone())
            .map_err(|e| CoreError::malformed(Collection::ApiCache.as_str(), e.to_string()))
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
