//! # Autosave Push
//!
//! Buffers autosaved form values and sends them in one batch to the
//! autosave endpoint:
//!
//! ```json
//! {"data": {"<key>": <value>, ...}, "timestamp": "2024-05-01T10:00:00.000Z"}
//! ```
//!
//! Values stay buffered until the backend accepts them. A value replaced
//! while a flush is in flight is kept for the next flush.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use harbor_core::response::iso8601;
use harbor_core::Request;

use crate::backend::Backend;
use crate::connectivity::Connectivity;
use crate::error::NetworkError;

/// Result of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// This many values were accepted.
    Flushed(usize),
    /// Nothing buffered.
    Empty,
    /// Offline; values kept.
    Deferred,
}

pub struct AutosaveSync {
    backend: Arc<dyn Backend>,
    connectivity: Connectivity,
    path: String,
    pending: Mutex<BTreeMap<String, Value>>,
}

impl AutosaveSync {
    pub fn new(backend: Arc<dyn Backend>, connectivity: Connectivity, path: impl Into<String>) -> Self {
        AutosaveSync {
            backend,
            connectivity,
            path: path.into(),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Buffers a value, replacing any earlier value for `key`.
    pub async fn stage(&self, key: impl Into<String>, value: Value) {
        self.pending.lock().await.insert(key.into(), value);
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Sends everything buffered.
    pub async fn flush(&self) -> Result<FlushOutcome, NetworkError> {
        if !self.connectivity.is_online() {
            debug!("Offline, deferring autosave flush");
            return Ok(FlushOutcome::Deferred);
        }

        let snapshot = self.pending.lock().await.clone();
        if snapshot.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let body = json!({
            "data": snapshot,
            "timestamp": iso8601(Utc::now()),
        });
        let response = self
            .backend
            .send(&Request::post(self.path.clone()).json(&body))
            .await?;

        if !response.is_success() {
            return Err(NetworkError::BackendRejection {
                status: response.status,
                url: self.path.clone(),
            });
        }

        let mut pending = self.pending.lock().await;
        for (key, sent) in &snapshot {
            if pending.get(key) == Some(sent) {
                pending.remove(key);
            }
        }

        info!(count = snapshot.len(), "Autosave flushed");
        Ok(FlushOutcome::Flushed(snapshot.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use harbor_core::Response;

    use crate::connectivity::connectivity;

    #[derive(Default)]
    struct Capture {
        status: u16,
        bodies: StdMutex<Vec<Value>>,
    }

    #[async_trait]
    impl Backend for Capture {
        async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
            let body = serde_json::from_str(request.body.as_deref().unwrap_or("null")).unwrap();
            self.bodies.lock().unwrap().push(body);
            Ok(Response::new(self.status, Default::default(), Vec::new()))
        }
    }

    #[tokio::test]
    async fn test_flush_sends_batch_and_clears() {
        let backend = Arc::new(Capture { status: 200, ..Default::default() });
        let (_signal, reader) = connectivity(true);
        let autosave = AutosaveSync::new(backend.clone(), reader, "/api/autosave/sync/");

        autosave.stage("order_note", json!("leave at door")).await;
        autosave.stage("discount", json!(5)).await;

        assert_eq!(autosave.flush().await.unwrap(), FlushOutcome::Flushed(2));
        assert_eq!(autosave.pending_len().await, 0);

        let sent = backend.bodies.lock().unwrap()[0].clone();
        assert_eq!(sent["data"]["discount"], 5);
        assert!(sent["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_rejected_flush_keeps_values() {
        let backend = Arc::new(Capture { status: 500, ..Default::default() });
        let (_signal, reader) = connectivity(true);
        let autosave = AutosaveSync::new(backend, reader, "/api/autosave/sync/");

        autosave.stage("draft", json!({"qty": 2})).await;
        let err = autosave.flush().await.unwrap_err();
        assert!(matches!(err, NetworkError::BackendRejection { status: 500, .. }));
        assert_eq!(autosave.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_offline_flush_is_deferred() {
        let backend = Arc::new(Capture { status: 200, ..Default::default() });
        let (_signal, reader) = connectivity(false);
        let autosave = AutosaveSync::new(backend.clone(), reader, "/api/autosave/sync/");

        autosave.stage("draft", json!(1)).await;
        assert_eq!(autosave.flush().await.unwrap(), FlushOutcome::Deferred);
        assert!(backend.bodies.lock().unwrap().is_empty());
        assert_eq!(autosave.flush().await.unwrap(), FlushOutcome::Deferred);
    }
}
