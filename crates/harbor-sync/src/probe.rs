//! # Connectivity Probe
//!
//! Headless stand-in for a platform online/offline event: polls the
//! backend's health path and owns the [`ConnectivitySignal`].
//!
//! ```text
//!   online  ──► probe every interval
//!   offline ──► probe with exponential backoff (capped)
//! ```
//!
//! Any HTTP response counts as reachable; only transport failures mean
//! offline.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use harbor_core::Request;

use crate::backend::Backend;
use crate::config::HarborConfig;
use crate::connectivity::{Connectivity, ConnectivitySignal};

/// Polls the backend and publishes connectivity.
pub struct ConnectivityProbe {
    backend: Arc<dyn Backend>,
    signal: ConnectivitySignal,
    health_path: String,
    interval: Duration,
    max_backoff: Duration,
}

impl ConnectivityProbe {
    pub fn new(backend: Arc<dyn Backend>, signal: ConnectivitySignal, config: &HarborConfig) -> Self {
        ConnectivityProbe {
            backend,
            signal,
            health_path: config.backend.health_path.clone(),
            interval: Duration::from_secs(config.sync.probe_interval_secs),
            max_backoff: Duration::from_secs(config.sync.probe_max_backoff_secs),
        }
    }

    /// Overrides the probe intervals.
    pub fn with_intervals(mut self, interval: Duration, max_backoff: Duration) -> Self {
        self.interval = interval;
        self.max_backoff = max_backoff;
        self
    }

    pub fn subscribe(&self) -> Connectivity {
        self.signal.subscribe()
    }

    /// Probes once and publishes the result.
    pub async fn check(&self) -> bool {
        let online = match self.backend.send(&Request::get(self.health_path.clone())).await {
            Ok(response) => {
                debug!(status = response.status, "Health probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                !e.is_connectivity()
            }
        };
        self.signal.set_online(online);
        online
    }

    /// Spawns the probe loop.
    pub fn start(self) -> ProbeHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        ProbeHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(path = %self.health_path, "Connectivity probe starting");

        let mut backoff = ExponentialBackoff {
            initial_interval: self.interval.min(self.max_backoff),
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            let wait = if self.check().await {
                backoff.reset();
                self.interval
            } else {
                backoff.next_backoff().unwrap_or(self.max_backoff)
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.recv() => {
                    info!("Connectivity probe received shutdown");
                    break;
                }
            }
        }
    }
}

/// Handle for a running probe.
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use harbor_core::Response;

    use crate::connectivity::connectivity;
    use crate::error::NetworkError;

    struct Toggle(AtomicBool);

    #[async_trait]
    impl Backend for Toggle {
        async fn send(&self, _request: &Request) -> Result<Response, NetworkError> {
            if self.0.load(Ordering::SeqCst) {
                Ok(Response::new(503, Default::default(), Vec::new()))
            } else {
                Err(NetworkError::Connectivity("refused".into()))
            }
        }
    }

    #[tokio::test]
    async fn test_check_publishes_state() {
        let backend = Arc::new(Toggle(AtomicBool::new(false)));
        let (signal, reader) = connectivity(true);
        let probe = ConnectivityProbe::new(backend.clone(), signal, &HarborConfig::default());

        assert!(!probe.check().await);
        assert!(!reader.is_online());

        // A 503 still proves the backend is reachable
        backend.0.store(true, Ordering::SeqCst);
        assert!(probe.check().await);
        assert!(reader.is_online());
    }

    #[tokio::test]
    async fn test_loop_detects_recovery() {
        let backend = Arc::new(Toggle(AtomicBool::new(false)));
        let (signal, mut reader) = connectivity(false);
        let handle = ConnectivityProbe::new(backend.clone(), signal, &HarborConfig::default())
            .with_intervals(Duration::from_millis(10), Duration::from_millis(20))
            .start();

        backend.0.store(true, Ordering::SeqCst);
        let online = tokio::time::timeout(Duration::from_secs(2), reader.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(online);

        handle.shutdown().await;
    }
}
