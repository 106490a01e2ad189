//! # Sync Coordinator
//!
//! Replays queued mutations and offline-created entities once the backend
//! is reachable.
//!
//! ## Drain Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  trigger: reconnect │ poll tick (online) │ manual                      │
//! │                        │                                                │
//! │                        ▼                                                │
//! │               offline? ──yes──► DrainOutcome::Offline                  │
//! │                        │                                                │
//! │               guard held? ─yes─► DrainOutcome::Skipped                 │
//! │                        │                                                │
//! │                        ▼                                                │
//! │   ┌──────────── pass (up to drain_attempts) ─────────────┐            │
//! │   │ form_queue → orders → customers → products → inventory│            │
//! │   │   oldest first, one record at a time                  │            │
//! │   │                                                       │            │
//! │   │   2xx            → synced                             │            │
//! │   │   non-2xx        → retries+1, dead-letter at cap      │            │
//! │   │   network error  → abort pass, record untouched       │            │
//! │   │   edited in flight → left pending, drained again      │            │
//! │   └───────────────────────────────────────────────────────┘            │
//! │         │ clean → Completed                                            │
//! │         │ failed → wait drain_retry_delay, next pass                   │
//! │         │ out of passes → Exhausted + "Some data failed to sync"       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each pass costs a pending record at most one attempt, so the per-record
//! cap is what ends a record's life; pass count only bounds a cycle.
//!
//! Delivery is at-least-once. A record whose response was lost after the
//! backend applied it will be sent again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use harbor_core::{
    Collection, CoordinatorStatus, DrainProgress, Notice, QueuedRequest, Record, Request,
    Severity,
};
use harbor_db::{Database, Settlement};

use crate::backend::Backend;
use crate::config::{EntityEndpoints, SyncSettings};
use crate::connectivity::Connectivity;
use crate::error::{NetworkError, SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter};

pub const RECONNECT_MESSAGE: &str = "Connection restored. Syncing offline data...";
pub const DISCONNECT_MESSAGE: &str =
    "You are now offline. Changes will sync when connection is restored.";
pub const SYNCED_MESSAGE: &str = "All offline data has been synced successfully!";
pub const EXHAUSTED_MESSAGE: &str = "Some data failed to sync. It will retry automatically.";
pub const OFFLINE_MANUAL_MESSAGE: &str = "Cannot sync while offline";

// =============================================================================
// Settings
// =============================================================================

/// Coordinator tuning, usually derived from [`SyncSettings`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub max_record_retries: u32,
    pub drain_attempts: u32,
    pub drain_retry_delay: Duration,
    pub poll_interval: Duration,
    pub synced_retention: chrono::Duration,
    pub endpoints: EntityEndpoints,
}

impl From<&SyncSettings> for CoordinatorSettings {
    fn from(sync: &SyncSettings) -> Self {
        CoordinatorSettings {
            max_record_retries: sync.max_record_retries,
            drain_attempts: sync.drain_attempts.max(1),
            drain_retry_delay: sync.drain_retry_delay(),
            poll_interval: sync.poll_interval(),
            synced_retention: sync.synced_retention(),
            endpoints: sync.endpoints.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings::from(&SyncSettings::default())
    }
}

// =============================================================================
// Drain Guard
// =============================================================================

/// Allows at most one drain cycle at a time.
#[derive(Debug, Default)]
pub struct DrainGuard {
    active: AtomicBool,
}

/// Held for the duration of a drain; releases the guard on drop.
#[derive(Debug)]
pub struct DrainToken<'a> {
    guard: &'a DrainGuard,
}

impl DrainGuard {
    pub fn try_acquire(&self) -> Option<DrainToken<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainToken { guard: self })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for DrainToken<'_> {
    fn drop(&mut self) {
        self.guard.active.store(false, Ordering::Release);
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Counters for one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub passes: u32,
    pub synced: u32,
    pub rejected: u32,
    pub dead_lettered: u32,
}

/// How a drain request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A pass finished with nothing left pending.
    Completed(DrainReport),
    /// Every pass failed; pending work waits for the next trigger.
    Exhausted(DrainReport),
    /// Connectivity dropped between passes.
    Interrupted(DrainReport),
    /// Another drain was already running.
    Skipped,
    /// Not started because the backend is unreachable.
    Offline,
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(r) | DrainOutcome::Exhausted(r) | DrainOutcome::Interrupted(r) => Some(r),
            DrainOutcome::Skipped | DrainOutcome::Offline => None,
        }
    }
}

enum PassResult {
    Clean,
    /// Rejected records are still pending.
    Incomplete,
    /// Records edited while in flight are pending with their new payload.
    Changed,
    /// Network failure mid-pass.
    Aborted,
}

enum Delivery {
    Synced,
    Rejected(String),
    Deferred(NetworkError),
}

// =============================================================================
// Sync Coordinator
// =============================================================================

struct Inner {
    db: Database,
    backend: Arc<dyn Backend>,
    connectivity: Connectivity,
    settings: CoordinatorSettings,
    guard: DrainGuard,
    status: RwLock<CoordinatorStatus>,
    emitter: Arc<dyn SyncEventEmitter>,
}

/// Drains pending records to the backend. Cheap to clone.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Creates a coordinator with a no-op emitter.
    pub fn new(
        db: Database,
        backend: Arc<dyn Backend>,
        connectivity: Connectivity,
        settings: CoordinatorSettings,
    ) -> Self {
        Self::with_emitter(db, backend, connectivity, settings, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        db: Database,
        backend: Arc<dyn Backend>,
        connectivity: Connectivity,
        settings: CoordinatorSettings,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let status = CoordinatorStatus {
            online: connectivity.is_online(),
            ..Default::default()
        };

        SyncCoordinator {
            inner: Arc::new(Inner {
                db,
                backend,
                connectivity,
                settings,
                guard: DrainGuard::default(),
                status: RwLock::new(status),
                emitter,
            }),
        }
    }

    pub async fn status(&self) -> CoordinatorStatus {
        self.inner.status.read().await.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.guard.is_active()
    }

    /// User-initiated sync. Offline, this only tells the user so.
    pub async fn manual_sync(&self) -> DrainOutcome {
        if !self.inner.connectivity.is_online() {
            self.inner.emitter.emit_notice(&Notice::transient(
                Severity::Warning,
                OFFLINE_MANUAL_MESSAGE,
            ));
            return DrainOutcome::Offline;
        }
        self.sync_now().await
    }

    /// Runs one drain cycle unless offline or already draining.
    pub async fn sync_now(&self) -> DrainOutcome {
        if !self.inner.connectivity.is_online() {
            debug!("Offline, not draining");
            return DrainOutcome::Offline;
        }

        let Some(_token) = self.inner.guard.try_acquire() else {
            debug!("Drain already in progress");
            return DrainOutcome::Skipped;
        };

        self.set_draining(true).await;
        info!("Drain cycle starting");

        let settings = &self.inner.settings;
        let mut report = DrainReport::default();
        let mut delays = Constant::new(settings.drain_retry_delay);

        let outcome = loop {
            report.passes += 1;

            let failure = match self.drain_pass(&mut report).await {
                Ok(PassResult::Clean) => break DrainOutcome::Completed(report),
                Ok(PassResult::Changed) if report.passes < settings.drain_attempts => {
                    debug!(pass = report.passes, "Records changed in flight, draining again");
                    continue;
                }
                Ok(PassResult::Changed) => "Records kept changing during drain".to_string(),
                Ok(PassResult::Incomplete) => "Some records were rejected by the backend".to_string(),
                Ok(PassResult::Aborted) => "Connectivity lost during drain".to_string(),
                Err(e) => {
                    error!(error = %e, pass = report.passes, "Drain pass failed");
                    e.to_string()
                }
            };
            self.inner.status.write().await.last_error = Some(failure);

            if report.passes >= settings.drain_attempts {
                break DrainOutcome::Exhausted(report);
            }
            if !self.inner.connectivity.is_online() {
                break DrainOutcome::Interrupted(report);
            }

            let delay = delays.next_backoff().unwrap_or(settings.drain_retry_delay);
            debug!(?delay, pass = report.passes, "Retrying drain after delay");
            tokio::time::sleep(delay).await;

            if !self.inner.connectivity.is_online() {
                break DrainOutcome::Interrupted(report);
            }
        };

        self.finish_cycle(&outcome).await;
        outcome
    }

    async fn finish_cycle(&self, outcome: &DrainOutcome) {
        match outcome {
            DrainOutcome::Completed(report) => {
                info!(synced = report.synced, passes = report.passes, "Drain cycle completed");
                if report.synced > 0 {
                    self.inner
                        .emitter
                        .emit_notice(&Notice::transient(Severity::Success, SYNCED_MESSAGE));
                }
                if let Err(e) = self
                    .inner
                    .db
                    .sync_queue()
                    .purge_synced(self.inner.settings.synced_retention)
                    .await
                {
                    warn!(error = %e, "Failed to purge synced records");
                }
                self.inner.status.write().await.last_error = None;
            }
            DrainOutcome::Exhausted(report) => {
                warn!(passes = report.passes, rejected = report.rejected, "Drain attempts exhausted");
                self.inner
                    .emitter
                    .emit_notice(&Notice::transient(Severity::Warning, EXHAUSTED_MESSAGE));
            }
            DrainOutcome::Interrupted(report) => {
                info!(passes = report.passes, "Drain interrupted by connectivity loss");
            }
            DrainOutcome::Skipped | DrainOutcome::Offline => {}
        }

        {
            let mut status = self.inner.status.write().await;
            status.draining = false;
            status.last_drain_at = Some(Utc::now());
        }
        self.refresh_status().await;
    }

    // =========================================================================
    // Pass
    // =========================================================================

    async fn drain_pass(&self, report: &mut DrainReport) -> SyncResult<PassResult> {
        let queue = self.inner.db.sync_queue();
        let max_retries = self.inner.settings.max_record_retries;
        let mut left_pending = false;
        let mut changed = false;

        for collection in Collection::DRAIN_ORDER {
            let records = queue.pending(collection).await?;
            if records.is_empty() {
                continue;
            }

            let total = u32::try_from(records.len()).unwrap_or(u32::MAX);
            debug!(collection = %collection, count = total, "Draining collection");

            for (index, record) in records.iter().enumerate() {
                if !self.inner.connectivity.is_online() {
                    info!(collection = %collection, "Offline mid-drain, aborting pass");
                    return Ok(PassResult::Aborted);
                }

                let Some(id) = record.id() else {
                    warn!(collection = %collection, key = %record.key, "Skipping record without numeric id");
                    continue;
                };

                match self.deliver(record).await {
                    Delivery::Synced => match queue.mark_synced(record).await? {
                        Settlement::Applied(()) => {
                            report.synced += 1;
                            debug!(collection = %collection, id, "Record synced");
                        }
                        Settlement::Superseded => changed = true,
                        Settlement::Gone => {}
                    },
                    Delivery::Rejected(reason) => match queue.record_failure(record, &reason, max_retries).await? {
                        Settlement::Applied(outcome) => {
                            report.rejected += 1;
                            if outcome.dead_lettered {
                                report.dead_lettered += 1;
                                self.inner.emitter.emit_notice(&Notice::persistent(
                                    Severity::Warning,
                                    format!(
                                        "{} record {} could not be synced after {} attempts: {}",
                                        collection, id, outcome.retries, reason
                                    ),
                                ));
                            } else {
                                left_pending = true;
                            }
                        }
                        Settlement::Superseded => changed = true,
                        Settlement::Gone => {}
                    },
                    Delivery::Deferred(e) => {
                        warn!(collection = %collection, id, error = %e, "Backend unreachable, aborting pass");
                        return Ok(PassResult::Aborted);
                    }
                }

                self.inner.emitter.emit_progress(&DrainProgress {
                    collection,
                    processed: u32::try_from(index + 1).unwrap_or(u32::MAX),
                    total,
                });
            }
        }

        Ok(if left_pending {
            PassResult::Incomplete
        } else if changed {
            PassResult::Changed
        } else {
            PassResult::Clean
        })
    }

    async fn deliver(&self, record: &Record) -> Delivery {
        let request = match self.replay_request(record) {
            Ok(request) => request,
            Err(reason) => return Delivery::Rejected(reason),
        };

        match self.inner.backend.send(&request).await {
            Ok(response) if response.is_success() => Delivery::Synced,
            Ok(response) => Delivery::Rejected(
                NetworkError::BackendRejection {
                    status: response.status,
                    url: request.target,
                }
                .to_string(),
            ),
            Err(e) if e.is_connectivity() => Delivery::Deferred(e),
            Err(e) => Delivery::Rejected(e.to_string()),
        }
    }

    /// Request that replays a pending record.
    ///
    /// Queued requests go back to their own URL and method; entities are
    /// POSTed to their collection's endpoint.
    fn replay_request(&self, record: &Record) -> Result<Request, String> {
        if record.collection == Collection::FormQueue {
            let queued = QueuedRequest::from_record(record).map_err(|e| e.to_string())?;
            let mut request = Request::new(queued.method, queued.url);
            request.headers = queued.headers;
            request.body = queued.body;
            return Ok(request);
        }

        self.inner
            .settings
            .endpoints
            .endpoint_for(record.collection)
            .map(|endpoint| Request::post(endpoint).json(&record.payload))
            .ok_or_else(|| format!("no replay endpoint for {}", record.collection))
    }

    // =========================================================================
    // Status
    // =========================================================================

    async fn set_draining(&self, draining: bool) {
        let snapshot = {
            let mut status = self.inner.status.write().await;
            status.draining = draining;
            status.online = self.inner.connectivity.is_online();
            status.clone()
        };
        self.inner.emitter.emit_status(&snapshot);
    }

    /// Re-reads counts from the store and emits the new status.
    pub async fn refresh_status(&self) -> CoordinatorStatus {
        let counts = self.inner.db.sync_queue().count_by_status().await;

        let snapshot = {
            let mut status = self.inner.status.write().await;
            status.online = self.inner.connectivity.is_online();
            match counts {
                Ok(counts) => {
                    status.pending = counts.pending;
                    status.dead_lettered = counts.failed;
                }
                Err(e) => {
                    error!(error = %e, "Failed to count records");
                    status.last_error = Some(e.to_string());
                }
            }
            status.clone()
        };

        self.inner.emitter.emit_status(&snapshot);
        snapshot
    }

    // =========================================================================
    // Background Loop
    // =========================================================================

    /// Spawns the trigger loop and returns its handle.
    pub fn start(&self) -> SyncCoordinatorHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(self.clone().run(trigger_rx, shutdown_rx));

        SyncCoordinatorHandle {
            coordinator: self.clone(),
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    async fn run(self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(poll_interval = ?self.inner.settings.poll_interval, "Sync coordinator starting");

        let mut interval = tokio::time::interval(self.inner.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut connectivity = self.inner.connectivity.clone();
        let mut signal_alive = true;

        self.refresh_status().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.inner.connectivity.is_online() {
                        self.spawn_cycle(false);
                    }
                }

                changed = connectivity.changed(), if signal_alive => {
                    match changed {
                        Ok(true) => {
                            self.inner
                                .emitter
                                .emit_notice(&Notice::transient(Severity::Success, RECONNECT_MESSAGE));
                            self.spawn_cycle(false);
                        }
                        Ok(false) => {
                            self.inner
                                .emitter
                                .emit_notice(&Notice::transient(Severity::Warning, DISCONNECT_MESSAGE));
                            self.refresh_status().await;
                        }
                        Err(e) => {
                            warn!(error = %e, "Connectivity signal closed");
                            signal_alive = false;
                        }
                    }
                }

                Some(()) = trigger_rx.recv() => {
                    self.spawn_cycle(true);
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync coordinator received shutdown");
                    break;
                }
            }
        }

        info!("Sync coordinator stopped");
    }

    /// Drains in a separate task so the loop keeps serving triggers.
    fn spawn_cycle(&self, manual: bool) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let outcome = if manual {
                coordinator.manual_sync().await
            } else {
                coordinator.sync_now().await
            };
            debug!(?outcome, manual, "Drain request finished");
        });
    }
}

// =============================================================================
// Coordinator Handle (for external control)
// =============================================================================

/// Handle for a running coordinator loop.
pub struct SyncCoordinatorHandle {
    coordinator: SyncCoordinator,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncCoordinatorHandle {
    pub async fn status(&self) -> CoordinatorStatus {
        self.coordinator.status().await
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Requests a manual sync. A trigger already queued absorbs this one.
    pub fn trigger_sync(&self) -> SyncResult<()> {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::ShuttingDown),
        }
    }

    /// Stops the loop and waits for it. A drain already running finishes
    /// on its own.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Sync coordinator task failed");
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncCoordinator with options.
pub struct SyncCoordinatorBuilder {
    settings: CoordinatorSettings,
    db: Option<Database>,
    backend: Option<Arc<dyn Backend>>,
    connectivity: Option<Connectivity>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncCoordinatorBuilder {
    pub fn new(settings: CoordinatorSettings) -> Self {
        SyncCoordinatorBuilder {
            settings,
            db: None,
            backend: None,
            connectivity: None,
            emitter: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> SyncResult<SyncCoordinator> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let backend = self
            .backend
            .ok_or_else(|| SyncError::InvalidConfig("Backend required".into()))?;
        let connectivity = self
            .connectivity
            .ok_or_else(|| SyncError::InvalidConfig("Connectivity required".into()))?;
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncCoordinator::with_emitter(
            db,
            backend,
            connectivity,
            self.settings,
            emitter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_guard_is_exclusive() {
        let guard = DrainGuard::default();

        let token = guard.try_acquire().unwrap();
        assert!(guard.is_active());
        assert!(guard.try_acquire().is_none());

        drop(token);
        assert!(!guard.is_active());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn bails(guard: &DrainGuard) -> Result<(), &'static str> {
            let _token = guard.try_acquire().ok_or("busy")?;
            Err("failed mid-drain")
        }

        let guard = DrainGuard::default();
        assert!(bails(&guard).is_err());
        assert!(!guard.is_active());
    }

    #[test]
    fn test_settings_from_sync_settings() {
        let settings = CoordinatorSettings::default();
        assert_eq!(settings.max_record_retries, 3);
        assert_eq!(settings.drain_attempts, 3);
        assert_eq!(settings.drain_retry_delay, Duration::from_secs(5));
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_requires_database() {
        let (_signal, connectivity) = crate::connectivity::connectivity(true);
        let result = SyncCoordinatorBuilder::new(CoordinatorSettings::default())
            .with_connectivity(connectivity)
            .build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }
}
