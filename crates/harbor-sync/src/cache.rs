//! # Tiered Cache
//!
//! Executes the policy the [`PolicyTable`] assigns to a read.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CacheFirst            hit ──► cached                                  │
//! │                        miss ─► network ─► store (2xx) ─► response      │
//! │                                                                         │
//! │  NetworkFirst          network ok ─► store (2xx) ─► response           │
//! │                        network err ─► cached, else error               │
//! │                                                                         │
//! │  StaleWhileRevalidate  hit ──► cached now, refresh in spawned task     │
//! │                        miss ─► network ─► store (2xx) ─► response      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`TieredCache::execute`] leaves the final miss as an error so the
//! interceptor can pick the offline fallback.
//!
//! Store failures while reading or writing the cache are logged and treated
//! as misses; a broken cache never breaks a read that the network can serve.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use harbor_core::{CacheEntry, CachePolicy, Classification, PolicyTable, Request, Response, ServedFrom};
use harbor_db::CacheRepository;

use crate::backend::Backend;
use crate::config::CacheSettings;
use crate::error::NetworkError;

/// Policy executor over the `api_cache` collection.
#[derive(Clone)]
pub struct TieredCache {
    repo: CacheRepository,
    backend: Arc<dyn Backend>,
    table: Arc<PolicyTable>,
    ttls: CacheSettings,
}

impl TieredCache {
    pub fn new(
        repo: CacheRepository,
        backend: Arc<dyn Backend>,
        table: PolicyTable,
        ttls: CacheSettings,
    ) -> Self {
        TieredCache {
            repo,
            backend,
            table: Arc::new(table),
            ttls,
        }
    }

    pub fn classify(&self, request: &Request) -> Classification {
        self.table.classify(request)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Fresh cached entry for a request, if any.
    pub async fn lookup(&self, request: &Request, classification: &Classification) -> Option<CacheEntry> {
        let key = CacheEntry::key_for(request.method, &request.target);
        match self
            .repo
            .get_fresh(&key, self.ttls.ttl_for(classification.tier))
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = %request.target, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores a network response if it is cacheable.
    ///
    /// Only 2xx responses to non-mutating requests are kept.
    pub async fn store(&self, request: &Request, classification: &Classification, response: &Response) {
        if request.is_mutation() || !response.is_success() || response.served_from != ServedFrom::Network {
            return;
        }

        let entry = CacheEntry {
            url: CacheEntry::key_for(request.method, &request.target),
            method: request.method,
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            body: response.body.clone(),
            stored_at: Utc::now(),
            tier: classification.tier,
        };

        if let Err(e) = self.repo.put(&entry).await {
            warn!(url = %request.target, error = %e, "Cache write failed");
        }
    }

    // =========================================================================
    // Strategy Execution
    // =========================================================================

    /// Runs the request's policy. A miss that the network cannot fill is
    /// returned as the network error.
    pub async fn execute(
        &self,
        request: &Request,
        classification: &Classification,
    ) -> Result<Response, NetworkError> {
        match classification.policy {
            CachePolicy::CacheFirst => {
                if let Some(entry) = self.lookup(request, classification).await {
                    debug!(url = %request.target, tier = classification.tier.as_str(), "Cache hit");
                    return Ok(Response::from_cache(&entry));
                }
                self.fetch_and_store(request, classification).await
            }
            CachePolicy::NetworkFirst { .. } => {
                match self.fetch_and_store(request, classification).await {
                    Ok(response) => Ok(response),
                    Err(e) if e.is_connectivity() => {
                        match self.lookup(request, classification).await {
                            Some(entry) => {
                                debug!(url = %request.target, "Network failed, serving cached copy");
                                Ok(Response::from_cache(&entry))
                            }
                            None => Err(e),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            CachePolicy::StaleWhileRevalidate => {
                if let Some(entry) = self.lookup(request, classification).await {
                    self.spawn_refresh(request.clone(), *classification);
                    return Ok(Response::from_cache(&entry));
                }
                self.fetch_and_store(request, classification).await
            }
        }
    }

    /// Fetches each path into the cache under its own tier.
    ///
    /// Paths without a file extension are fetched as page loads. Failures
    /// are logged and skipped.
    ///
    /// ## Returns
    /// Number of paths fetched successfully.
    pub async fn warm(&self, paths: &[String]) -> usize {
        let mut warmed = 0;

        for path in paths {
            let request = if has_extension(path) {
                Request::get(path.as_str())
            } else {
                Request::navigate(path.as_str())
            };
            let classification = self.classify(&request);

            match self.fetch_and_store(&request, &classification).await {
                Ok(response) if response.is_success() => warmed += 1,
                Ok(response) => warn!(url = %path, status = response.status, "Precache fetch rejected"),
                Err(e) => warn!(url = %path, error = %e, "Precache fetch failed"),
            }
        }

        info!(warmed, total = paths.len(), "Cache warmed");
        warmed
    }

    async fn fetch_and_store(
        &self,
        request: &Request,
        classification: &Classification,
    ) -> Result<Response, NetworkError> {
        let response = self.backend.send(request).await?;
        self.store(request, classification, &response).await;
        Ok(response)
    }

    fn spawn_refresh(&self, request: Request, classification: Classification) {
        let cache = self.clone();
        tokio::spawn(async move {
            match cache.fetch_and_store(&request, &classification).await {
                Ok(response) => {
                    debug!(url = %request.target, status = response.status, "Background refresh done")
                }
                Err(e) => debug!(url = %request.target, error = %e, "Background refresh failed"),
            }
        });
    }
}

fn has_extension(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'))
}
