//! # Cache Policy Table
//!
//! Decides, once per request, which caching policy applies.
//!
//! ## Policy Dispatch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Declarative Policy Table                           │
//! │                                                                         │
//! │  Request ──► rule 1 ──► rule 2 ──► ... ──► fallback rule               │
//! │                │           │                    │                       │
//! │            first match wins (evaluated top to bottom)                   │
//! │                                                                         │
//! │  Matcher                       Class         Policy          Tier      │
//! │  ────────────────────────────  ────────────  ──────────────  ───────   │
//! │  /static/, /, favicon, manif.  StaticAsset   CacheFirst      static    │
//! │  .jpg .png .gif .webp .svg ..  Image         CacheFirst      images    │
//! │  /api/                         ApiRead       NetworkFirst    api       │
//! │  navigation / Accept: html     Page          NetworkFirst    pages     │
//! │  (anything else)               Secondary     StaleWhileRev.  dynamic   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table is data: hosts can replace rows without touching the
//! executor in `harbor-sync`.

use serde::{Deserialize, Serialize};

use crate::http::Request;
use crate::types::CacheTier;

// =============================================================================
// Policy Types
// =============================================================================

/// What the request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    StaticAsset,
    Image,
    ApiRead,
    Page,
    Secondary,
}

/// What to synthesize when network-first finds neither network nor cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// The static offline HTML document.
    OfflinePage,
    /// A structured JSON offline error.
    OfflineApiError,
}

/// How a read is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// Serve the cached copy if present; otherwise fetch and store.
    CacheFirst,
    /// Always try the network; fall back to cache, then to `fallback`.
    NetworkFirst { fallback: Fallback },
    /// Serve the cached copy now and refresh it in the background.
    StaleWhileRevalidate,
}

/// Request predicate for one row of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Matcher {
    PathPrefix(String),
    PathExact(String),
    /// Any of these lowercase extensions, without the dot.
    Extension(Vec<String>),
    Navigation,
    AcceptsHtml,
    AnyOf(Vec<Matcher>),
    Any,
}

impl Matcher {
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::PathPrefix(prefix) => request.path().starts_with(prefix.as_str()),
            Matcher::PathExact(path) => request.path() == path,
            Matcher::Extension(extensions) => request
                .extension()
                .map(|ext| extensions.iter().any(|e| *e == ext))
                .unwrap_or(false),
            Matcher::Navigation => request.navigation,
            Matcher::AcceptsHtml => request.accepts_html(),
            Matcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(request)),
            Matcher::Any => true,
        }
    }
}

/// One `(predicate → class)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub matcher: Matcher,
    pub class: ResourceClass,
    pub policy: CachePolicy,
    pub tier: CacheTier,
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: ResourceClass,
    pub policy: CachePolicy,
    pub tier: CacheTier,
}

impl From<&PolicyRule> for Classification {
    fn from(rule: &PolicyRule) -> Self {
        Classification {
            class: rule.class,
            policy: rule.policy,
            tier: rule.tier,
        }
    }
}

// =============================================================================
// Policy Table
// =============================================================================

/// Image extensions recognised by the default table.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "ico"];

/// Ordered rules plus a catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
    fallback: PolicyRule,
}

impl PolicyTable {
    /// Builds a table from explicit rows. Unmatched requests get
    /// stale-while-revalidate in the dynamic tier.
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        PolicyTable {
            rules,
            fallback: PolicyRule {
                matcher: Matcher::Any,
                class: ResourceClass::Secondary,
                policy: CachePolicy::StaleWhileRevalidate,
                tier: CacheTier::Dynamic,
            },
        }
    }

    /// The default table with the API namespace at `api_prefix`.
    pub fn with_api_prefix(api_prefix: &str) -> Self {
        PolicyTable::new(vec![
            PolicyRule {
                matcher: Matcher::AnyOf(vec![
                    Matcher::PathPrefix("/static/".to_string()),
                    Matcher::PathExact("/".to_string()),
                    Matcher::PathExact("/favicon.ico".to_string()),
                    Matcher::PathExact("/manifest.json".to_string()),
                ]),
                class: ResourceClass::StaticAsset,
                policy: CachePolicy::CacheFirst,
                tier: CacheTier::Static,
            },
            PolicyRule {
                matcher: Matcher::Extension(
                    IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
                ),
                class: ResourceClass::Image,
                policy: CachePolicy::CacheFirst,
                tier: CacheTier::Images,
            },
            PolicyRule {
                matcher: Matcher::PathPrefix(api_prefix.to_string()),
                class: ResourceClass::ApiRead,
                policy: CachePolicy::NetworkFirst {
                    fallback: Fallback::OfflineApiError,
                },
                tier: CacheTier::Api,
            },
            PolicyRule {
                matcher: Matcher::AnyOf(vec![Matcher::Navigation, Matcher::AcceptsHtml]),
                class: ResourceClass::Page,
                policy: CachePolicy::NetworkFirst {
                    fallback: Fallback::OfflinePage,
                },
                tier: CacheTier::Pages,
            },
        ])
    }

    /// Classifies a request. Total: every request gets a policy.
    pub fn classify(&self, request: &Request) -> Classification {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(request))
            .unwrap_or(&self.fallback)
            .into()
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        PolicyTable::with_api_prefix("/api/")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
