//! # Connectivity Signal
//!
//! Process-wide online/offline state with exactly one writer.
//!
//! ```text
//!   platform event / ConnectivityProbe
//!                │
//!                ▼
//!   ConnectivitySignal ──watch──► Connectivity (clone per reader)
//!     (one owner)                   ├── NetworkInterceptor
//!                                   └── SyncCoordinator
//! ```
//!
//! Readers always ask the channel for the current value; nobody keeps a copy
//! across an await point.

use tokio::sync::watch;
use tracing::info;

use crate::error::{SyncError, SyncResult};

/// Creates a signal/reader pair with the given initial state.
pub fn connectivity(initially_online: bool) -> (ConnectivitySignal, Connectivity) {
    let (tx, rx) = watch::channel(initially_online);
    (ConnectivitySignal { tx }, Connectivity { rx })
}

/// The only writer of connectivity state. Deliberately not `Clone`.
#[derive(Debug)]
pub struct ConnectivitySignal {
    tx: watch::Sender<bool>,
}

impl ConnectivitySignal {
    /// Publishes the current state.
    ///
    /// ## Returns
    /// `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new reader.
    pub fn subscribe(&self) -> Connectivity {
        Connectivity {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the connectivity signal.
#[derive(Debug, Clone)]
pub struct Connectivity {
    rx: watch::Receiver<bool>,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the next transition and returns the new state.
    ///
    /// Fails once the signal has been dropped.
    pub async fn changed(&mut self) -> SyncResult<bool> {
        self.rx
            .changed()
            .await
            .map_err(|_| SyncError::ChannelError("connectivity signal dropped".into()))?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Returns once the signal reads online.
    pub async fn wait_online(&mut self) -> SyncResult<()> {
        while !self.is_online() {
            self.changed().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readers_see_writes() {
        let (signal, reader) = connectivity(false);
        let other = reader.clone();

        assert!(!reader.is_online());
        assert!(signal.set_online(true));
        assert!(reader.is_online());
        assert!(other.is_online());
    }

    #[tokio::test]
    async fn test_wait_online_returns_after_reconnect() {
        let (signal, reader) = connectivity(false);

        let waiter = tokio::spawn({
            let mut reader = reader.clone();
            async move { reader.wait_online().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        signal.set_online(true);
        assert!(waiter.await.unwrap().is_ok());

        // Already online returns at once
        let mut reader = reader;
        assert!(reader.wait_online().await.is_ok());
    }

    #[tokio::test]
    async fn test_repeated_state_is_not_a_transition() {
        let (signal, mut reader) = connectivity(true);
        assert!(!signal.set_online(true));

        assert!(signal.set_online(false));
        assert!(!reader.changed().await.unwrap());
    }

    #[tokio::test]
    async fn test_changed_fails_after_signal_dropped() {
        let (signal, mut reader) = connectivity(true);
        drop(signal);
        assert!(reader.changed().await.is_err());
    }
}
