//! # Status & Notices
//!
//! Values the sync coordinator reports outward. The embedding UI reads
//! these through the generated TypeScript bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Collection;

/// How long a transient notice stays on screen.
pub const TRANSIENT_NOTICE_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Auto-dismisses after [`TRANSIENT_NOTICE_SECS`].
    Transient,
    /// Stays until the user acts (dead letters).
    Persistent,
}

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notice {
    pub kind: NoticeKind,
    pub severity: Severity,
    pub message: String,
    pub dismiss_after_secs: Option<u64>,
}

impl Notice {
    pub fn transient(severity: Severity, message: impl Into<String>) -> Self {
        Notice {
            kind: NoticeKind::Transient,
            severity,
            message: message.into(),
            dismiss_after_secs: Some(TRANSIENT_NOTICE_SECS),
        }
    }

    pub fn persistent(severity: Severity, message: impl Into<String>) -> Self {
        Notice {
            kind: NoticeKind::Persistent,
            severity,
            message: message.into(),
            dismiss_after_secs: None,
        }
    }
}

/// Snapshot of the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CoordinatorStatus {
    pub online: bool,
    pub draining: bool,
    /// Records waiting for delivery across drained collections.
    pub pending: u64,
    /// Records whose retry budget is exhausted.
    pub dead_lettered: u64,
    #[ts(as = "Option<String>")]
    pub last_drain_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Progress of a drain pass, per collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DrainProgress {
    pub collection: Collection,
    pub processed: u32,
    pub total: u32,
}
