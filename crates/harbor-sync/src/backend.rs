//! # Backend Transport
//!
//! The one place requests leave the process.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Request (target, method, headers, body)                              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   HttpBackend::send                                                    │
//! │        │  1. resolve target against base_url                           │
//! │        │  2. drop caller-supplied credential headers                   │
//! │        │  3. attach Cookie / CSRF from SessionProvider (at send time)  │
//! │        ▼                                                                │
//! │   reqwest::Client ───► Response { status, headers, body }              │
//! │                                                                         │
//! │   Transport failures become NetworkError::Connectivity / Timeout.      │
//! │   Any HTTP status, including 4xx/5xx, is a Response.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credentials are never written to the store: queued requests are stripped
//! with [`strip_credentials`] before persisting, and replay picks up
//! whatever session is current at replay time.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use tracing::debug;
use url::Url;

use harbor_core::{Request, Response};

use crate::config::BackendSettings;
use crate::error::{NetworkError, SyncError, SyncResult};

/// Headers that carry credentials and must not be persisted.
const CREDENTIAL_HEADERS: [&str; 4] = ["cookie", "authorization", "x-csrftoken", "x-csrf-token"];

// =============================================================================
// Backend Trait
// =============================================================================

/// Sends a request to the backend.
///
/// `Ok` for any HTTP response. `Err` only when no response was obtained.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, NetworkError>;
}

// =============================================================================
// Session
// =============================================================================

/// Auth material for the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub session_token: String,
    pub csrf_token: Option<String>,
}

/// Source of the current session, read at send time.
pub trait SessionProvider: Send + Sync {
    fn credentials(&self) -> Option<SessionCredentials>;
}

/// In-memory session the host updates on login/logout.
#[derive(Debug, Default)]
pub struct SharedSession {
    inner: RwLock<Option<SessionCredentials>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: SessionCredentials) -> Self {
        SharedSession {
            inner: RwLock::new(Some(credentials)),
        }
    }

    pub fn set(&self, credentials: SessionCredentials) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(credentials);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }
}

impl SessionProvider for SharedSession {
    fn credentials(&self) -> Option<SessionCredentials> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}

/// Removes credential headers (case-insensitive).
///
/// ## Arguments
/// * `extra` - additional header names to strip, e.g. the configured CSRF header
pub fn strip_credentials(
    headers: &BTreeMap<String, String>,
    extra: &[String],
) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !is_credential_header(name, extra))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_credential_header(name: &str, extra: &[String]) -> bool {
    CREDENTIAL_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
        || extra.iter().any(|h| name.eq_ignore_ascii_case(h))
}

// =============================================================================
// HTTP Backend
// =============================================================================

/// [`Backend`] over reqwest.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<dyn SessionProvider>,
    session_cookie: String,
    csrf_header: String,
}

impl HttpBackend {
    /// Creates a backend from settings.
    ///
    /// ## Errors
    /// - `InvalidUrl` if `base_url` does not parse
    /// - `ClientFailed` if the HTTP client cannot be built
    pub fn new(settings: &BackendSettings, session: Arc<dyn SessionProvider>) -> SyncResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::ClientFailed(e.to_string()))?;

        Ok(HttpBackend {
            client,
            base_url,
            session,
            session_cookie: settings.session_cookie.clone(),
            csrf_header: settings.csrf_header.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a request target.
    pub fn resolve(&self, target: &str) -> Result<Url, NetworkError> {
        Ok(self.base_url.join(target)?)
    }

    /// Header names stripped before a request is persisted.
    pub fn credential_headers(&self) -> Vec<String> {
        vec![self.csrf_header.clone()]
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = self.resolve(&request.target)?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, url);

        let extra = self.credential_headers();
        for (name, value) in &request.headers {
            if !is_credential_header(name, &extra) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        if let Some(credentials) = self.session.credentials() {
            builder = builder.header(
                COOKIE,
                format!("{}={}", self.session_cookie, credentials.session_token),
            );
            if let (true, Some(csrf)) = (request.is_mutation(), credentials.csrf_token) {
                builder = builder.header(self.csrf_header.as_str(), csrf);
            }
        }

        if let Some(body) = &request.body {
            if request.get_header("Content-Type").is_none() {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(method = %request.method, target = %request.target, status, "Backend responded");
        Ok(Response::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_credentials() {
        let mut headers = BTreeMap::new();
        headers.insert("Cookie".to_string(), "sessionid=abc".to_string());
        headers.insert("Authorization".to_string(), "Bearer x".to_string());
        headers.insert("X-CSRFToken".to_string(), "tok".to_string());
        headers.insert("X-Till".to_string(), "2".to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let stripped = strip_credentials(&headers, &["X-Custom-Csrf".to_string()]);
        assert_eq!(stripped.len(), 2);
        assert!(stripped.contains_key("X-Till"));
        assert!(stripped.contains_key("Content-Type"));
    }

    #[test]
    fn test_shared_session() {
        let session = SharedSession::new();
        assert!(session.credentials().is_none());

        session.set(SessionCredentials {
            session_token: "abc".into(),
            csrf_token: Some("csrf".into()),
        });
        assert_eq!(session.credentials().unwrap().session_token, "abc");

        session.clear();
        assert!(session.credentials().is_none());
    }

    #[test]
    fn test_resolve_target_against_base() {
        let settings = BackendSettings {
            base_url: "https://shop.example.com/".into(),
            ..Default::default()
        };
        let backend = HttpBackend::new(&settings, Arc::new(SharedSession::new())).unwrap();

        let url = backend.resolve("/api/inventory/42/?fresh=1").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/api/inventory/42/?fresh=1");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connectivity_error() {
        // Port 9 on loopback is discard; nothing listens there in test environments
        let settings = BackendSettings {
            base_url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let backend = HttpBackend::new(&settings, Arc::new(SharedSession::new())).unwrap();

        let err = backend.send(&Request::get("/api/health/")).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
