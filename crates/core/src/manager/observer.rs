//! Observers of configuration cycles.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::ConfigureResult;

/// Notified at the start and end of every configuration cycle.
///
/// Observers run on the manager's sequence and must not block. To react with
/// a new request, post it through a [`ManagerHandle`](super::ManagerHandle).
pub trait DataTypeManagerObserver: Send {
    fn on_configure_start(&mut self);
    fn on_configure_done(&mut self, result: &ConfigureResult);
}

/// A configuration notification as sent over a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigureNotification {
    Started,
    Done(ConfigureResult),
}

/// Observer that fans notifications out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<ConfigureNotification>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigureNotification> {
        self.tx.subscribe()
    }

    fn send(&self, notification: ConfigureNotification) {
        // No subscribers is fine.
        let _ = self.tx.send(notification);
    }
}

impl DataTypeManagerObserver for BroadcastObserver {
    fn on_configure_start(&mut self) {
        self.send(ConfigureNotification::Started);
    }

    fn on_configure_done(&mut self, result: &ConfigureResult) {
        self.send(ConfigureNotification::Done(result.clone()));
    }
}
