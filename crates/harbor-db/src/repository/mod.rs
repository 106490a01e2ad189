//! # Repository Module
//!
//! Store access for Harbor, split by concern.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Interceptor / Coordinator                                             │
//! │       │                                                                 │
//! │       │  db.sync_queue().pending(Collection::FormQueue)                │
//! │       ▼                                                                 │
//! │  SyncQueueRepository ──┐                                               │
//! │  CacheRepository ──────┼──► PersistentStore ──► records table          │
//! │                        │    (save / get / get_all / delete / clear)    │
//! │                        └──► direct status updates                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PersistentStore`](records::PersistentStore) - Generic record CRUD
//! - [`SyncQueueRepository`](sync::SyncQueueRepository) - Delivery bookkeeping
//! - [`CacheRepository`](cache::CacheRepository) - Cached responses

pub mod cache;
pub mod records;
pub mod sync;
