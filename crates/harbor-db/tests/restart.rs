//! Queued work survives closing and reopening the store.

use std::collections::BTreeMap;

use harbor_core::{Collection, HttpMethod, NewRecord, QueuedRequest, SyncStatus};
use harbor_db::{Database, DbConfig};
use serde_json::json;

#[tokio::test]
async fn test_pending_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harbor.db");

    let queued_id = {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let id = db
            .sync_queue()
            .queue_request(&QueuedRequest::new(
                "/api/orders/create/",
                HttpMethod::Post,
                BTreeMap::new(),
                Some(json!({"customer": "Alice", "qty": 3}).to_string()),
            ))
            .await
            .unwrap();
        db.records()
            .save(Collection::Orders, NewRecord::new(json!({"order_identifier": "ORD-1"})))
            .await
            .unwrap();
        db.close().await;
        id
    };

    let db = Database::new(DbConfig::new(&path)).await.unwrap();

    let pending = db.sync_queue().pending_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, Some(queued_id));
    assert_eq!(pending[0].sync_status, SyncStatus::Pending);

    let orders = db.sync_queue().pending(Collection::Orders).await.unwrap();
    assert_eq!(orders[0].payload["order_identifier"], "ORD-1");

    // Sequence continues after reopen
    let next = db
        .sync_queue()
        .queue_request(&QueuedRequest::new(
            "/api/customers/",
            HttpMethod::Post,
            BTreeMap::new(),
            None,
        ))
        .await
        .unwrap();
    assert!(next > queued_id);
}
