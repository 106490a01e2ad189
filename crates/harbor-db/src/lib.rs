//! # harbor-db: Persistent Store for Harbor
//!
//! Durable local storage for records that must survive restarts: business
//! entities written while offline, queued requests, and cached responses.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Harbor Data Flow                                 │
//! │                                                                         │
//! │  NetworkInterceptor / SyncCoordinator (harbor-sync)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     harbor-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ PersistentStore│   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SyncQueueRepo  │   │ 001_initial  │  │   │
//! │  │   │ open_or_      │    │ CacheRepo      │   │              │  │   │
//! │  │   │   degrade     │    │                │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   <data dir>/harbor.db                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harbor_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/harbor.db")).await?;
//! let key = db.records().save(Collection::Orders, NewRecord::new(payload)).await?;
//! let pending = db.sync_queue().pending(Collection::Orders).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cache::CacheRepository;
pub use repository::records::{CollectionSize, PersistentStore};
pub use repository::sync::{FailureOutcome, Settlement, StatusCounts, SyncQueueRepository};
