//! # Network Interceptor
//!
//! Single entry point for every outbound request the application makes.
//!
//! ## Decision Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       fetch(request)                                    │
//! │                             │                                           │
//! │        ┌────────────────────┼─────────────────────┐                    │
//! │        ▼                    ▼                     ▼                    │
//! │   1. bypass prefix     2./3. offline          4. online                │
//! │      (/login/, ...)         │                     │                    │
//! │        │              ┌─────┴──────┐        ┌─────┴───────┐            │
//! │        ▼              ▼            ▼        ▼             ▼            │
//! │     network       mutation       read     mutation       read          │
//! │     as-is         queue + 202    cache /  network;       tier policy;  │
//! │                                  page /   queue on       offline-read  │
//! │                                  NoOffl.  conn. failure  on failure    │
//! │                                                                         │
//! │   No store (degraded): everything goes straight to the network.        │
//! │   respond(): unservable network-first reads become offline responses.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use harbor_core::response::{offline_api_error, offline_page, queued_ack};
use harbor_core::{
    route, BypassList, CachePolicy, Fallback, PolicyTable, QueuedRequest, Request, ResourceClass, Response,
    Route,
};
use harbor_db::Database;

use crate::backend::{strip_credentials, Backend};
use crate::cache::TieredCache;
use crate::config::HarborConfig;
use crate::connectivity::Connectivity;
use crate::error::NetworkError;

/// Routes requests to the network, the cache or the offline queue.
#[derive(Clone)]
pub struct NetworkInterceptor {
    store: Option<Database>,
    cache: Option<TieredCache>,
    backend: Arc<dyn Backend>,
    connectivity: Connectivity,
    bypass: BypassList,
    credential_headers: Vec<String>,
}

impl NetworkInterceptor {
    /// Creates an interceptor.
    ///
    /// ## Arguments
    /// * `store` - `None` runs in degraded mode (no queue, no cache)
    pub fn new(
        store: Option<Database>,
        backend: Arc<dyn Backend>,
        connectivity: Connectivity,
        config: &HarborConfig,
    ) -> Self {
        let cache = store.as_ref().map(|db| {
            TieredCache::new(
                db.cache(),
                backend.clone(),
                PolicyTable::with_api_prefix(&config.interceptor.api_prefix),
                config.cache.clone(),
            )
        });

        if store.is_none() {
            warn!("Offline store unavailable, interceptor running in degraded mode");
        }

        NetworkInterceptor {
            store,
            cache,
            backend,
            connectivity,
            bypass: BypassList::new(&config.interceptor.bypass_prefixes),
            credential_headers: vec![config.backend.csrf_header.clone()],
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.store.is_none()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Fetches `paths` into the cache. Does nothing in degraded mode.
    pub async fn warm_cache(&self, paths: &[String]) -> usize {
        match &self.cache {
            Some(cache) => cache.warm(paths).await,
            None => 0,
        }
    }

    /// Fetches a request, returning a response or a [`NetworkError`].
    pub async fn fetch(&self, request: Request) -> Result<Response, NetworkError> {
        let Some(cache) = &self.cache else {
            return self.fetch_degraded(&request).await;
        };

        let decision = route(&request, self.connectivity.is_online(), &self.bypass);
        debug!(method = %request.method, url = %request.target, route = ?decision, "Routing request");

        match decision {
            Route::Bypass => self.backend.send(&request).await,
            Route::QueueMutation => self.queue(&request).await,
            Route::OfflineRead => self.offline_read(cache, &request).await,
            Route::Network if request.is_mutation() => self.send_mutation(&request).await,
            Route::Network => self.network_read(cache, &request).await,
        }
    }

    /// Fetches a request and answers every read the network and cache
    /// cannot serve with its synthesized fallback: the offline page for
    /// pages, the structured `503` for API reads.
    ///
    /// Cache-first assets and degraded mode keep the error.
    pub async fn respond(&self, request: Request) -> Result<Response, NetworkError> {
        let policy = match &self.cache {
            Some(cache) if !request.is_mutation() => cache.classify(&request).policy,
            _ => return self.fetch(request).await,
        };
        let target = request.target.clone();

        match self.fetch(request).await {
            Err(e) if e.is_connectivity() || matches!(e, NetworkError::NoOfflineData { .. }) => match policy {
                CachePolicy::NetworkFirst { fallback } => {
                    debug!(url = %target, error = %e, "Nothing to serve, synthesizing offline response");
                    Ok(match fallback {
                        Fallback::OfflinePage => offline_page(),
                        Fallback::OfflineApiError => offline_api_error(),
                    })
                }
                _ => Err(e),
            },
            other => other,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    async fn send_mutation(&self, request: &Request) -> Result<Response, NetworkError> {
        match self.backend.send(request).await {
            Err(e) if e.is_connectivity() => {
                warn!(url = %request.target, error = %e, "Mutation failed at network level, queueing");
                self.queue(request).await
            }
            other => other,
        }
    }

    /// Persists a mutation and acknowledges it with `202 Accepted`.
    async fn queue(&self, request: &Request) -> Result<Response, NetworkError> {
        let Some(db) = &self.store else {
            return Err(NetworkError::StoreUnavailable("no offline store".into()));
        };

        let mut queued = QueuedRequest::new(
            request.target.clone(),
            request.method,
            strip_credentials(&request.headers, &self.credential_headers),
            request.body.clone(),
        );

        let id = db
            .sync_queue()
            .queue_request(&queued)
            .await
            .map_err(|e| NetworkError::StoreUnavailable(e.to_string()))?;
        queued.id = Some(id);

        info!(id, url = %queued.url, method = %queued.method, "Queued offline mutation");
        Ok(queued_ack(id, &queued))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    async fn network_read(&self, cache: &TieredCache, request: &Request) -> Result<Response, NetworkError> {
        let classification = cache.classify(request);
        match cache.execute(request, &classification).await {
            Err(e) if e.is_connectivity() => {
                debug!(url = %request.target, error = %e, "Network read failed, trying offline fallback");
                self.offline_read(cache, request).await.map_err(|fallback| match fallback {
                    NetworkError::NoOfflineData { .. } => e,
                    other => other,
                })
            }
            other => other,
        }
    }

    async fn offline_read(&self, cache: &TieredCache, request: &Request) -> Result<Response, NetworkError> {
        let classification = cache.classify(request);

        if let Some(entry) = cache.lookup(request, &classification).await {
            debug!(url = %request.target, tier = classification.tier.as_str(), "Serving cached copy offline");
            return Ok(Response::from_cache(&entry));
        }

        if request.navigation || classification.class == ResourceClass::Page {
            return Ok(offline_page());
        }

        Err(NetworkError::NoOfflineData {
            url: request.target.clone(),
        })
    }

    // =========================================================================
    // Degraded Mode
    // =========================================================================

    async fn fetch_degraded(&self, request: &Request) -> Result<Response, NetworkError> {
        match self.backend.send(request).await {
            Err(e) if e.is_connectivity() && request.is_mutation() && !self.bypass.is_bypassed(request.path()) => {
                Err(NetworkError::StoreUnavailable(format!(
                    "cannot queue {} {}: {}",
                    request.method, request.target, e
                )))
            }
            other => other,
        }
    }
}
