//! # Request / Response Model
//!
//! Transport-neutral request and response values. The interceptor,
//! the cache tiers and the backend all speak these types; only the
//! backend knows about a real HTTP client.
//!
//! Targets are origin-relative (`/api/orders/create/?x=1`). The backend
//! joins them onto its base URL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::types::{CacheEntry, HttpMethod};

/// Header names are compared case-insensitively.
fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// =============================================================================
// Request
// =============================================================================

/// An outbound request as issued by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: HttpMethod,
    /// Path plus optional query string.
    pub target: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Set for top-level page navigations.
    pub navigation: bool,
}

impl Request {
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Request {
            method,
            target: target.into(),
            headers: BTreeMap::new(),
            body: None,
            navigation: false,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Request::new(HttpMethod::Get, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Request::new(HttpMethod::Post, target)
    }

    /// A top-level page load.
    pub fn navigate(target: impl Into<String>) -> Self {
        let mut request = Request::get(target);
        request.navigation = true;
        request
            .headers
            .insert("Accept".to_string(), "text/html".to_string());
        request
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a JSON body and content type.
    pub fn json(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Target without query string or fragment.
    pub fn path(&self) -> &str {
        let end = self
            .target
            .find(|c| c == '?' || c == '#')
            .unwrap_or(self.target.len());
        &self.target[..end]
    }

    /// Lowercased file extension of the last path segment, if any.
    pub fn extension(&self) -> Option<String> {
        let segment = self.path().rsplit('/').next()?;
        let (_, ext) = segment.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }

    pub fn accepts_html(&self) -> bool {
        self.get_header("Accept")
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }

    pub fn is_mutation(&self) -> bool {
        self.method.is_mutation()
    }
}

// =============================================================================
// Response
// =============================================================================

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    Network,
    Cache,
    /// Synthesized acknowledgement for a queued mutation.
    Queue,
    /// Synthesized offline page or offline error body.
    Placeholder,
}

/// A response handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub served_from: ServedFrom,
}

impl Response {
    /// A network response.
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
        Response {
            status,
            headers,
            body,
            served_from: ServedFrom::Network,
        }
    }

    /// A JSON response.
    pub fn json(status: u16, body: &Value, served_from: ServedFrom) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Response {
            status,
            headers,
            body: body.to_string().into_bytes(),
            served_from,
        }
    }

    /// An HTML response.
    pub fn html(status: u16, body: &str, served_from: ServedFrom) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        Response {
            status,
            headers,
            body: body.as_bytes().to_vec(),
            served_from,
        }
    }

    /// Replays a cached response, marked with `X-Cached: true`.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(content_type) = &entry.content_type {
            headers.insert("Content-Type".to_string(), content_type.clone());
        }
        headers.insert("X-Cached".to_string(), "true".to_string());
        Response {
            status: entry.status,
            headers,
            body: entry.body.clone(),
            served_from: ServedFrom::Cache,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::types::CacheTier;

    #[test]
    fn test_path_strips_query() {
        let request = Request::get("/api/inventory/42/?fields=stock#top");
        assert_eq!(request.path(), "/api/inventory/42/");
    }

    #[test]
    fn test_extension() {
        assert_eq!(Request::get("/media/Logo.PNG").extension().as_deref(), Some("png"));
        assert_eq!(Request::get("/api/orders/").extension(), None);
        assert_eq!(Request::get("/v1.2/orders").extension(), None);
    }

    #[test]
    fn test_navigation_accepts_html() {
        let request = Request::navigate("/dashboard/");
        assert!(request.navigation);
        assert!(request.accepts_html());
        assert!(!Request::get("/api/x/").accepts_html());
    }

    #[test]
    fn test_headers_case_insensitive() {
        let request = Request::post("/api/orders/create/").json(&json!({"a": 1}));
        assert_eq!(request.get_header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_from_cache_marks_response() {
        let entry = CacheEntry {
            url: "/api/inventory/42/".into(),
            method: HttpMethod::Get,
            status: 200,
            content_type: Some("application/json".into()),
            body: br#"{"stock":5}"#.to_vec(),
            stored_at: Utc::now(),
            tier: CacheTier::Api,
        };

        let response = Response::from_cache(&entry);
        assert_eq!(response.served_from, ServedFrom::Cache);
        assert_eq!(response.get_header("x-cached"), Some("true"));
        assert_eq!(response.body_json().unwrap()["stock"], 5);
    }
}
