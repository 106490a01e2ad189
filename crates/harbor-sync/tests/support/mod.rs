//! Shared fixtures for harbor-sync integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use harbor_core::{CoordinatorStatus, DrainProgress, Notice, NoticeKind, Request, Response};
use harbor_db::{Database, DbConfig};
use harbor_sync::{Backend, CoordinatorSettings, NetworkError, SyncEventEmitter};

pub type Responder = Arc<dyn Fn(&Request) -> Result<Response, NetworkError> + Send + Sync>;

/// In-process backend with a swappable responder.
pub struct MockBackend {
    responder: Mutex<Responder>,
    sent: Mutex<Vec<Request>>,
    gate: Option<Gate>,
}

/// Holds each send until released.
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl MockBackend {
    pub fn new(responder: impl Fn(&Request) -> Result<Response, NetworkError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(MockBackend {
            responder: Mutex::new(Arc::new(responder)),
            sent: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn gated(responder: impl Fn(&Request) -> Result<Response, NetworkError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(MockBackend {
            responder: Mutex::new(Arc::new(responder)),
            sent: Mutex::new(Vec::new()),
            gate: Some(Gate {
                entered: Notify::new(),
                release: Notify::new(),
            }),
        })
    }

    pub fn respond_with(&self, responder: impl Fn(&Request) -> Result<Response, NetworkError> + Send + Sync + 'static) {
        *self.responder.lock().unwrap() = Arc::new(responder);
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("backend is not gated")
    }

    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_targets(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.target).collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
        self.sent.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let responder = self.responder.lock().unwrap().clone();
        responder(request)
    }
}

pub fn status(code: u16) -> Result<Response, NetworkError> {
    Ok(Response::new(code, Default::default(), b"{}".to_vec()))
}

pub fn json_ok(body: &str) -> Result<Response, NetworkError> {
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    Ok(Response::new(200, headers, body.as_bytes().to_vec()))
}

pub fn unreachable() -> Result<Response, NetworkError> {
    Err(NetworkError::Connectivity("connection refused".into()))
}

/// Collects every event.
#[derive(Default)]
pub struct RecordingEmitter {
    pub notices: Mutex<Vec<Notice>>,
    pub statuses: Mutex<Vec<CoordinatorStatus>>,
    pub progress: Mutex<Vec<DrainProgress>>,
}

impl RecordingEmitter {
    pub fn messages(&self) -> Vec<String> {
        self.notices.lock().unwrap().iter().map(|n| n.message.clone()).collect()
    }

    pub fn persistent(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == NoticeKind::Persistent)
            .cloned()
            .collect()
    }
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit_status(&self, status: &CoordinatorStatus) {
        self.statuses.lock().unwrap().push(status.clone());
    }

    fn emit_progress(&self, progress: &DrainProgress) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn emit_notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// Default settings with short pauses between passes.
pub fn fast_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        drain_retry_delay: Duration::from_millis(10),
        ..CoordinatorSettings::default()
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
