//! # Interceptor Routing
//!
//! The pure half of the interceptor: which path a request takes.
//!
//! ```text
//!   bypassed prefix? ──yes──► Bypass          (straight to network)
//!        │ no
//!   mutation && offline? ──► QueueMutation    (store + 202 ack)
//!        │ no
//!   read && offline? ──────► OfflineRead      (cache tiers or NoOfflineData)
//!        │ no
//!        └─────────────────► Network          (tier policy, mirror to cache)
//! ```

use serde::{Deserialize, Serialize};

use crate::http::Request;

/// Paths that must always reach the backend directly.
pub const DEFAULT_BYPASS_PREFIXES: [&str; 7] = [
    "/login/",
    "/logout/",
    "/staff/",
    "/admin/",
    "/api/auth/",
    "/api/autosave/",
    "/api/send-sms/",
];

/// Prefix list for endpoints that are never queued or cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassList {
    prefixes: Vec<String>,
}

impl BypassList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BypassList {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl Default for BypassList {
    fn default() -> Self {
        BypassList::new(DEFAULT_BYPASS_PREFIXES)
    }
}

/// Path chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bypass,
    QueueMutation,
    OfflineRead,
    Network,
}

/// First matching rule wins.
pub fn route(request: &Request, online: bool, bypass: &BypassList) -> Route {
    if bypass.is_bypassed(request.path()) {
        Route::Bypass
    } else if online {
        Route::Network
    } else if request.is_mutation() {
        Route::QueueMutation
    } else {
        Route::OfflineRead
    }
}
