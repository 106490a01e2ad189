//! # harbor-sync: Network Layer for Harbor
//!
//! Keeps an application usable while the backend comes and goes. Writes made
//! offline are queued durably and acknowledged; reads fall back to tiered
//! caches; queued work is replayed in order once the backend is reachable.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   application                                                          │
//! │       │ fetch(Request)                                                 │
//! │       ▼                                                                 │
//! │   NetworkInterceptor ───────► TieredCache ──► api_cache               │
//! │       │   │                        │                                    │
//! │       │   └── queue (offline) ──► form_queue ◄── SyncCoordinator       │
//! │       │                                              │    ▲             │
//! │       ▼                                              ▼    │             │
//! │   Backend (reqwest) ◄────────────────────────────── replay │             │
//! │       ▲                                                   │             │
//! │   ConnectivityProbe ──► ConnectivitySignal ──► Connectivity             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`interceptor`] - Routing of every outbound request
//! - [`cache`] - Cache-first / network-first / stale-while-revalidate
//! - [`coordinator`] - Drain cycles, retries, dead letters
//! - [`connectivity`] - Single-writer online/offline signal
//! - [`probe`] - Health polling for headless hosts
//! - [`backend`] - HTTP transport and session credentials
//! - [`autosave`] - Batched autosave push
//! - [`events`] - Status, progress and notice emitters
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harbor_sync::{connectivity, HarborConfig, HttpBackend, NetworkInterceptor, SharedSession};
//!
//! let config = HarborConfig::load_or_default(None);
//! let db = Database::open_or_degrade(DbConfig::new(config.store.database_path())).await;
//! let backend = Arc::new(HttpBackend::new(&config.backend, Arc::new(SharedSession::new()))?);
//! let (signal, online) = connectivity(true);
//!
//! let interceptor = NetworkInterceptor::new(db.clone(), backend.clone(), online.clone(), &config);
//! let response = interceptor.fetch(Request::post("/api/orders/create/").json(&order)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod autosave;
pub mod backend;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod probe;

// =============================================================================
// Re-exports
// =============================================================================

pub use autosave::{AutosaveSync, FlushOutcome};
pub use backend::{strip_credentials, Backend, HttpBackend, SessionCredentials, SessionProvider, SharedSession};
pub use cache::TieredCache;
pub use config::{
    BackendSettings, CacheSettings, EntityEndpoints, HarborConfig, InterceptorSettings,
    StoreSettings, SyncSettings,
};
pub use connectivity::{connectivity, Connectivity, ConnectivitySignal};
pub use coordinator::{
    CoordinatorSettings, DrainGuard, DrainOutcome, DrainReport, SyncCoordinator,
    SyncCoordinatorBuilder, SyncCoordinatorHandle,
};
pub use error::{NetworkError, SyncError, SyncResult};
pub use events::{NoOpEmitter, SyncEventEmitter, TracingEmitter};
pub use interceptor::NetworkInterceptor;
pub use probe::{ConnectivityProbe, ProbeHandle};
