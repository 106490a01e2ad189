//! # Sync Events
//!
//! Outbound notifications from the coordinator to whatever renders them.

use tracing::{debug, error, info, warn};

use harbor_core::{CoordinatorStatus, DrainProgress, Notice, NoticeKind, Severity};

/// Receives coordinator events (implemented by the embedding UI).
pub trait SyncEventEmitter: Send + Sync {
    /// Status snapshot after any change.
    fn emit_status(&self, status: &CoordinatorStatus);

    /// Progress within one collection of a drain pass.
    fn emit_progress(&self, progress: &DrainProgress);

    /// A user-facing message.
    fn emit_notice(&self, notice: &Notice);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &CoordinatorStatus) {}
    fn emit_progress(&self, _progress: &DrainProgress) {}
    fn emit_notice(&self, _notice: &Notice) {}
}

/// Writes events to the log. Used by headless hosts.
pub struct TracingEmitter;

impl SyncEventEmitter for TracingEmitter {
    fn emit_status(&self, status: &CoordinatorStatus) {
        debug!(
            online = status.online,
            draining = status.draining,
            pending = status.pending,
            dead_lettered = status.dead_lettered,
            "Sync status"
        );
    }

    fn emit_progress(&self, progress: &DrainProgress) {
        debug!(
            collection = %progress.collection,
            processed = progress.processed,
            total = progress.total,
            "Drain progress"
        );
    }

    fn emit_notice(&self, notice: &Notice) {
        let persistent = notice.kind == NoticeKind::Persistent;
        match notice.severity {
            Severity::Info | Severity::Success => info!(persistent, "{}", notice.message),
            Severity::Warning => warn!(persistent, "{}", notice.message),
            Severity::Error => error!(persistent, "{}", notice.message),
        }
    }
}
