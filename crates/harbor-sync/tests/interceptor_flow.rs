//! Request routing through the interceptor: queueing, offline reads,
//! fallbacks and degraded mode.

mod support;

use chrono::{Duration, Utc};
use serde_json::json;

use harbor_core::response::OFFLINE_API_MESSAGE;
use harbor_core::{CacheEntry, CacheTier, Collection, HttpMethod, Request, ServedFrom, SyncStatus};
use harbor_sync::{connectivity, HarborConfig, NetworkError, NetworkInterceptor};

use support::{json_ok, memory_db, status, unreachable, MockBackend};

#[tokio::test]
async fn test_offline_order_is_queued_and_acknowledged() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| unreachable());
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(Some(db.clone()), backend.clone(), online, &HarborConfig::default());

    let response = interceptor
        .fetch(Request::post("/api/orders/create/").json(&json!({"customer": "Alice", "qty": 3})))
        .await
        .unwrap();

    assert_eq!(response.status, 202);
    assert_eq!(response.served_from, ServedFrom::Queue);
    let body = response.body_json().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["queued"], true);
    assert_eq!(body["offline"], true);

    let pending = db.sync_queue().pending_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, "/api/orders/create/");
    assert_eq!(pending[0].method, HttpMethod::Post);
    assert_eq!(pending[0].sync_status, SyncStatus::Pending);
    assert_eq!(pending[0].json_body().unwrap(), json!({"customer": "Alice", "qty": 3}));
    assert_eq!(body["queue_id"], pending[0].id.unwrap());

    assert!(backend.sent().is_empty());
}

#[tokio::test]
async fn test_ack_echoes_identifying_fields() {
    let db = memory_db().await;
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(
        Some(db),
        MockBackend::new(|_| unreachable()),
        online,
        &HarborConfig::default(),
    );

    let response = interceptor
        .fetch(Request::new(HttpMethod::Put, "/api/orders/17/").json(&json!({
            "order_identifier": "ORD-17",
            "customer_id": 4,
            "status": "paid",
        })))
        .await
        .unwrap();

    let body = response.body_json().unwrap();
    assert_eq!(body["order_identifier"], "ORD-17");
    assert_eq!(body["customer_id"], 4);
    assert!(body.get("status").is_none());
    assert_eq!(body["method"], "PUT");
}

#[tokio::test]
async fn test_credentials_are_not_persisted() {
    let db = memory_db().await;
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(
        Some(db.clone()),
        MockBackend::new(|_| unreachable()),
        online,
        &HarborConfig::default(),
    );

    interceptor
        .fetch(
            Request::post("/api/customers/")
                .header("Cookie", "sessionid=secret")
                .header("X-CSRFToken", "token")
                .header("X-Register", "till-2")
                .json(&json!({"name": "Bob"})),
        )
        .await
        .unwrap();

    let queued = &db.sync_queue().pending_requests().await.unwrap()[0];
    assert!(!queued.headers.contains_key("Cookie"));
    assert!(!queued.headers.contains_key("X-CSRFToken"));
    assert_eq!(queued.headers.get("X-Register").map(String::as_str), Some("till-2"));
}

#[tokio::test]
async fn test_offline_read_served_from_cache() {
    let db = memory_db().await;
    db.cache()
        .put(&CacheEntry {
            url: "/api/inventory/42/".into(),
            method: HttpMethod::Get,
            status: 200,
            content_type: Some("application/json".into()),
            body: br#"{"product_id":42,"stock":5}"#.to_vec(),
            stored_at: Utc::now() - Duration::minutes(10),
            tier: CacheTier::Api,
        })
        .await
        .unwrap();

    let backend = MockBackend::new(|_| unreachable());
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(Some(db), backend.clone(), online, &HarborConfig::default());

    let response = interceptor.fetch(Request::get("/api/inventory/42/")).await.unwrap();
    assert_eq!(response.served_from, ServedFrom::Cache);
    assert_eq!(response.get_header("X-Cached"), Some("true"));
    assert_eq!(response.body_json().unwrap()["stock"], 5);
    assert!(backend.sent().is_empty());
}

#[tokio::test]
async fn test_offline_read_without_cache_is_no_offline_data() {
    let db = memory_db().await;
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(
        Some(db),
        MockBackend::new(|_| unreachable()),
        online,
        &HarborConfig::default(),
    );

    let err = interceptor.fetch(Request::get("/api/inventory/99/")).await.unwrap_err();
    assert_eq!(
        err,
        NetworkError::NoOfflineData {
            url: "/api/inventory/99/".into()
        }
    );
    assert_ne!(err, NetworkError::Timeout);
    assert!(!err.is_connectivity());
}

#[tokio::test]
async fn test_offline_navigation_gets_placeholder() {
    let db = memory_db().await;
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(
        Some(db),
        MockBackend::new(|_| unreachable()),
        online,
        &HarborConfig::default(),
    );

    let response = interceptor.fetch(Request::navigate("/sales/today/")).await.unwrap();
    assert_eq!(response.served_from, ServedFrom::Placeholder);
    assert!(response.text().contains("You're Offline"));
}

#[tokio::test]
async fn test_respond_synthesizes_offline_api_error() {
    let db = memory_db().await;
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(
        Some(db),
        MockBackend::new(|_| unreachable()),
        online,
        &HarborConfig::default(),
    );

    let response = interceptor.respond(Request::get("/api/inventory/99/")).await.unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(response.served_from, ServedFrom::Placeholder);
    let body = response.body_json().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["offline"], true);
    assert_eq!(body["message"], OFFLINE_API_MESSAGE);
}

#[tokio::test]
async fn test_respond_after_online_failure_uses_fallback() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| Err(NetworkError::Timeout));
    let (_signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db), backend.clone(), online, &HarborConfig::default());

    let api = interceptor.respond(Request::get("/api/customers/")).await.unwrap();
    assert_eq!(api.status, 503);

    let page = interceptor.respond(Request::navigate("/dashboard/")).await.unwrap();
    assert_eq!(page.served_from, ServedFrom::Placeholder);
    assert!(page.text().contains("You're Offline"));

    // Cache-first assets have no synthesized form
    let err = interceptor.respond(Request::get("/static/js/pos.js")).await.unwrap_err();
    assert_eq!(err, NetworkError::Timeout);
    assert_eq!(backend.sent().len(), 3);
}

#[tokio::test]
async fn test_respond_passes_rejections_through() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| status(404));
    let (_signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db), backend, online, &HarborConfig::default());

    let response = interceptor.respond(Request::get("/api/products/404/")).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.served_from, ServedFrom::Network);
}

#[tokio::test]
async fn test_cache_first_asset_fetched_once_is_served_offline() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| json_ok("console.log('pos')"));
    let (signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db), backend.clone(), online, &HarborConfig::default());

    let first = interceptor.fetch(Request::get("/static/js/pos.js")).await.unwrap();
    assert_eq!(first.served_from, ServedFrom::Network);

    signal.set_online(false);
    backend.respond_with(|_| unreachable());

    let offline = interceptor.fetch(Request::get("/static/js/pos.js")).await.unwrap();
    assert_eq!(offline.served_from, ServedFrom::Cache);
    assert_eq!(offline.text(), "console.log('pos')");
    assert_eq!(backend.sent().len(), 1);
}

#[tokio::test]
async fn test_online_api_reads_are_mirrored_into_cache() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| json_ok(r#"[{"id":1}]"#));
    let (_signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db.clone()), backend, online, &HarborConfig::default());

    interceptor.fetch(Request::get("/api/products/?page=1")).await.unwrap();

    let entry = db.cache().get("/api/products/?page=1").await.unwrap().unwrap();
    assert_eq!(entry.tier, CacheTier::Api);
    assert_eq!(entry.body, br#"[{"id":1}]"#.to_vec());
}

#[tokio::test]
async fn test_online_read_failure_falls_back_once_then_propagates() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| Err(NetworkError::Timeout));
    let (_signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db), backend.clone(), online, &HarborConfig::default());

    let err = interceptor.fetch(Request::get("/api/customers/")).await.unwrap_err();
    assert_eq!(err, NetworkError::Timeout);
    assert_eq!(backend.sent().len(), 1);
}

#[tokio::test]
async fn test_online_mutation_network_failure_is_queued() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| unreachable());
    let (_signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db.clone()), backend.clone(), online, &HarborConfig::default());

    let response = interceptor
        .fetch(Request::post("/api/products/").json(&json!({"name": "Tea"})))
        .await
        .unwrap();

    assert_eq!(response.status, 202);
    assert_eq!(backend.sent().len(), 1);
    assert_eq!(db.sync_queue().pending(Collection::FormQueue).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_online_mutation_rejection_is_returned_not_queued() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| support::status(400));
    let (_signal, online) = connectivity(true);
    let interceptor = NetworkInterceptor::new(Some(db.clone()), backend, online, &HarborConfig::default());

    let response = interceptor
        .fetch(Request::post("/api/products/").json(&json!({})))
        .await
        .unwrap();

    assert_eq!(response.status, 400);
    assert!(db.sync_queue().pending_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bypass_paths_skip_queue_even_offline() {
    let db = memory_db().await;
    let backend = MockBackend::new(|_| unreachable());
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(Some(db.clone()), backend.clone(), online, &HarborConfig::default());

    let err = interceptor
        .fetch(Request::post("/login/").body("username=a&password=b"))
        .await
        .unwrap_err();

    assert!(err.is_connectivity());
    assert_eq!(backend.sent_targets(), vec!["/login/".to_string()]);
    assert!(db.sync_queue().pending_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_degraded_mode_goes_straight_to_network() {
    let backend = MockBackend::new(|_| unreachable());
    let (_signal, online) = connectivity(false);
    let interceptor = NetworkInterceptor::new(None, backend.clone(), online, &HarborConfig::default());
    assert!(interceptor.is_degraded());

    let write = interceptor
        .fetch(Request::post("/api/orders/create/").json(&json!({"qty": 1})))
        .await
        .unwrap_err();
    assert!(matches!(write, NetworkError::StoreUnavailable(_)));

    let read = interceptor.fetch(Request::get("/api/orders/")).await.unwrap_err();
    assert!(matches!(read, NetworkError::Connectivity(_)));

    assert_eq!(backend.sent().len(), 2);
}

#[tokio::test]
async fn test_warmed_pages_are_served_offline() {
    let db = memory_db().await;
    let backend = MockBackend::new(|request| json_ok(&format!("<html>{}</html>", request.target)));
    let (signal, online) = connectivity(true);
    let config = HarborConfig::default();
    let interceptor = NetworkInterceptor::new(Some(db), backend.clone(), online, &config);

    let warmed = interceptor.warm_cache(&config.cache.precache).await;
    assert_eq!(warmed, config.cache.precache.len());

    signal.set_online(false);
    let page = interceptor.fetch(Request::navigate("/orders/create/")).await.unwrap();
    assert_eq!(page.served_from, ServedFrom::Cache);
    assert_eq!(page.text(), "<html>/orders/create/</html>");
    assert_eq!(backend.sent().len(), warmed);

    // Degraded mode has nothing to warm
    let (_signal, online) = connectivity(true);
    let degraded = NetworkInterceptor::new(None, backend.clone(), online, &config);
    assert_eq!(degraded.warm_cache(&config.cache.precache).await, 0);
    assert_eq!(backend.sent().len(), warmed);
}
