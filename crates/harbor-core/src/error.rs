//! # Error Types
//!
//! Domain-specific error types for harbor-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  harbor-core errors (this file)                                        │
//! │  └── CoreError        - Malformed records, unknown names               │
//! │                                                                         │
//! │  harbor-db errors (separate crate)                                     │
//! │  └── DbError          - Persistence failures                           │
//! │                                                                         │
//! │  harbor-sync errors (separate crate)                                   │
//! │  ├── NetworkError     - What a caller of the interceptor sees          │
//! │  └── SyncError        - Configuration and coordinator failures         │
//! │                                                                         │
//! │  Flow: CoreError → DbError → NetworkError::StoreUnavailable            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A collection name that is not one of the six known stores.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A query named an index the collection does not declare.
    ///
    /// ## When This Occurs
    /// - `get_all(Collection::Orders, Some(IndexQuery::new("phone", ..)))`
    /// - Typos in index names coming from configuration
    #[error("Collection {collection} has no index named '{index}'")]
    UnknownIndex { collection: String, index: String },

    /// An HTTP method string we cannot interpret.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// An unrecognised sync status value.
    #[error("Invalid sync status: {0}")]
    InvalidSyncStatus(String),

    /// A stored record whose payload does not have the expected shape.
    ///
    /// ## When This Occurs
    /// - A `form_queue` row with no `url`
    /// - An `api_cache` row whose body is not valid base64
    #[error("Malformed {collection} record: {reason}")]
    MalformedRecord { collection: String, reason: String },

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a MalformedRecord error.
    pub fn malformed(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::MalformedRecord {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
