//! # harbor-core: Pure Types and Policy for Harbor
//!
//! Everything here is deterministic and free of I/O: record shapes, the
//! cache policy table, interceptor routing, and the responses Harbor
//! synthesizes when the backend cannot answer.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Harbor Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Application (UI, forms, autosave widgets)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Request                                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   harbor-sync: NetworkInterceptor ─► TieredCache ─► Backend     │   │
//! │  │                SyncCoordinator (background drain)               │   │
//! │  └───────────────┬─────────────────────────────┬───────────────────┘   │
//! │                  │                             │                        │
//! │  ┌───────────────▼─────────────┐   ┌──────────▼──────────────────┐    │
//! │  │  ★ harbor-core (THIS) ★     │   │  harbor-db: PersistentStore │    │
//! │  │  types · policy · routing   │◄──│  SQLite, six collections    │    │
//! │  │  response · status          │   └─────────────────────────────┘    │
//! │  │  NO I/O • PURE FUNCTIONS    │                                       │
//! │  └─────────────────────────────┘                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Collections, records, queued requests, cache entries
//! - [`http`] - Transport-neutral request/response values
//! - [`policy`] - Declarative cache policy table
//! - [`routing`] - Bypass list and interceptor route decision
//! - [`response`] - Queued acknowledgement and offline fallbacks
//! - [`status`] - Notices and coordinator status
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod http;
pub mod policy;
pub mod response;
pub mod routing;
pub mod status;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use http::{Request, Response, ServedFrom};
pub use policy::{CachePolicy, Classification, Fallback, Matcher, PolicyRule, PolicyTable, ResourceClass};
pub use routing::{route, BypassList, Route};
pub use status::{CoordinatorStatus, DrainProgress, Notice, NoticeKind, Severity};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// API cache entries older than this are treated as absent.
pub const DEFAULT_API_CACHE_TTL_SECS: u64 = 3600;

/// Failed deliveries before a record is dead-lettered.
pub const DEFAULT_MAX_RECORD_RETRIES: u32 = 3;

/// Passes per drain cycle before giving up until the next trigger.
pub const DEFAULT_DRAIN_ATTEMPTS: u32 = 3;

/// Pause between passes of one drain cycle.
pub const DEFAULT_DRAIN_RETRY_DELAY_MS: u64 = 5000;

/// Periodic drain interval while online.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
