//! # Sync Error Types
//!
//! Two layers of errors:
//!
//! - [`NetworkError`] is what a caller of the interceptor sees. Each variant
//!   is something a UI can act on differently.
//! - [`SyncError`] covers configuration, the coordinator and everything
//!   around it.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Harbor Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  NetworkError   │  │  Configuration  │  │     Coordinator         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Connectivity   │  │  InvalidConfig  │  │  ShuttingDown           │ │
//! │  │  Timeout        │  │  InvalidUrl     │  │  ChannelError           │ │
//! │  │  StoreUnavail.  │  │  ConfigLoad     │  │  Internal               │ │
//! │  │  BackendReject. │  │  ConfigSave     │  │                         │ │
//! │  │  NoOfflineData  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Network Errors
// =============================================================================

/// Failure of a single intercepted request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Backend unreachable (DNS, refused connection, reset).
    #[error("Network unreachable: {0}")]
    Connectivity(String),

    /// Backend did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// A mutation needed the offline store and it could not be opened
    /// or written.
    #[error("Offline storage unavailable: {0}")]
    StoreUnavailable(String),

    /// Backend answered with a non-success status during replay.
    #[error("Backend rejected {url}: HTTP {status}")]
    BackendRejection { status: u16, url: String },

    /// Offline read with nothing cached for the URL.
    #[error("No offline data available for {url}")]
    NoOfflineData { url: String },

    /// The request could not be turned into a backend call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl NetworkError {
    /// True for failures that mean "the backend is not reachable right now".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, NetworkError::Connectivity(_) | NetworkError::Timeout)
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_builder() {
            NetworkError::InvalidRequest(err.to_string())
        } else {
            NetworkError::Connectivity(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        NetworkError::InvalidRequest(err.to_string())
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Error type for everything outside a single request.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend URL.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// A request to the backend failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Failed to build the HTTP client.
    #[error("HTTP client error: {0}")]
    ClientFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Store query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal coordinator error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Coordinator is shutting down.
    #[error("Sync coordinator is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<harbor_db::DbError> for SyncError {
    fn from(err: harbor_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<harbor_core::CoreError> for SyncError {
    fn from(err: harbor_core::CoreError) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SyncError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SyncError::ChannelError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_classification() {
        assert!(NetworkError::Timeout.is_connectivity());
        assert!(NetworkError::Connectivity("refused".into()).is_connectivity());
        assert!(!NetworkError::NoOfflineData { url: "/api/x/".into() }.is_connectivity());
        assert!(!NetworkError::StoreUnavailable("disk".into()).is_connectivity());
    }

    #[test]
    fn test_no_offline_data_is_distinct_from_timeout() {
        let missing = NetworkError::NoOfflineData { url: "/api/products/".into() };
        assert_ne!(missing, NetworkError::Timeout);
        assert!(missing.to_string().contains("/api/products/"));
    }
}
