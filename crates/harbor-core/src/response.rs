//! # Synthesized Responses
//!
//! Responses produced locally when the backend cannot answer:
//! the queued-mutation acknowledgement, the structured offline API
//! error, and the offline HTML page.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::http::{Response, ServedFrom};
use crate::types::QueuedRequest;

pub const QUEUED_MESSAGE: &str = "Request queued for sync when connection is restored";

pub const OFFLINE_API_MESSAGE: &str =
    "You are currently offline. Data will sync when connection is restored.";

/// Served for navigations that neither network nor cache can satisfy.
pub const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Offline</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               display: flex; align-items: center; justify-content: center;
               min-height: 100vh; margin: 0; background: #f5f5f5; color: #333; }
        .card { text-align: center; padding: 2rem; max-width: 28rem; }
        button { margin-top: 1rem; padding: 0.6rem 1.4rem; border: 0; border-radius: 4px;
                 background: #2563eb; color: #fff; cursor: pointer; }
    </style>
</head>
<body>
    <div class="card">
        <h1>You're Offline</h1>
        <p>This page is not available offline. Changes you make elsewhere are
           saved on this device and will sync when the connection returns.</p>
        <button onclick="location.reload()">Try Again</button>
    </div>
</body>
</html>
"#;

pub fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Top-level fields that identify the entity a write touches:
/// `id`, `*_id`, `*_identifier`.
pub fn identifying_fields(body: &Value) -> Map<String, Value> {
    let Some(object) = body.as_object() else {
        return Map::new();
    };

    object
        .iter()
        .filter(|(key, value)| {
            (key.as_str() == "id" || key.ends_with("_id") || key.ends_with("_identifier"))
                && !value.is_object()
                && !value.is_array()
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// `202 Accepted` for a mutation captured while offline.
///
/// Carries the queue id plus the write's identifying fields so
/// optimistic UI code can keep going.
pub fn queued_ack(queue_id: i64, request: &QueuedRequest) -> Response {
    let mut body = json!({
        "success": true,
        "queued": true,
        "offline": true,
        "message": QUEUED_MESSAGE,
        "timestamp": iso8601(request.timestamp),
        "queue_id": queue_id,
        "url": request.url,
        "method": request.method.as_str(),
    });

    if let (Some(target), Some(source)) = (body.as_object_mut(), request.json_body()) {
        for (key, value) in identifying_fields(&source) {
            target.entry(key).or_insert(value);
        }
    }

    Response::json(202, &body, ServedFrom::Queue)
}

/// Structured error for an API read with no network and no cache.
pub fn offline_api_error() -> Response {
    Response::json(
        503,
        &json!({
            "success": false,
            "offline": true,
            "message": OFFLINE_API_MESSAGE,
            "cached": false,
        }),
        ServedFrom::Placeholder,
    )
}

/// The offline HTML document.
pub fn offline_page() -> Response {
    Response::html(200, OFFLINE_PAGE, ServedFrom::Placeholder)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::types::HttpMethod;

    #[test]
    fn test_queued_ack_shape() {
        let mut request = QueuedRequest::new(
            "/api/orders/create/",
            HttpMethod::Post,
            BTreeMap::new(),
            Some(json!({"customer": "Alice", "qty": 3, "order_identifier": "ORD-9"}).to_string()),
        );
        request.id = Some(12);

        let response = queued_ack(12, &request);
        assert_eq!(response.status, 202);
        assert_eq!(response.served_from, ServedFrom::Queue);

        let body = response.body_json().unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["queued"], true);
        assert_eq!(body["offline"], true);
        assert_eq!(body["queue_id"], 12);
        assert_eq!(body["order_identifier"], "ORD-9");
        assert!(body.get("customer").is_none());
    }

    #[test]
    fn test_identifying_fields_ignore_nested_values() {
        let fields = identifying_fields(&json!({
            "id": 4,
            "product_id": "p-1",
            "customer_ids": [1, 2],
            "meta_id": {"x": 1},
            "name": "Tea"
        }));
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("id"));
        assert!(fields.contains_key("product_id"));
    }

    #[test]
    fn test_ack_does_not_let_body_override_envelope() {
        let request = QueuedRequest::new(
            "/api/customers/",
            HttpMethod::Post,
            BTreeMap::new(),
            Some(json!({"queue_id": 999}).to_string()),
        );
        let body = queued_ack(3, &request).body_json().unwrap();
        assert_eq!(body["queue_id"], 3);
    }

    #[test]
    fn test_offline_api_error() {
        let response = offline_api_error();
        assert_eq!(response.status, 503);
        let body = response.body_json().unwrap();
        assert_eq!(body["offline"], true);
        assert_eq!(body["cached"], false);
    }

    #[test]
    fn test_offline_page_is_html() {
        let response = offline_page();
        assert!(response.content_type().unwrap().starts_with("text/html"));
        assert!(response.text().contains("You're Offline"));
    }
}
