//! Observer that records every notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::manager::{ConfigureNotification, ConfigureResult, DataTypeManagerObserver};

/// Records configuration notifications for test assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    notifications: Arc<Mutex<Vec<ConfigureNotification>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification received, in order.
    pub fn notifications(&self) -> Vec<ConfigureNotification> {
        self.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|n| matches!(n, ConfigureNotification::Started))
            .count()
    }

    /// Results of every finished cycle, in order.
    pub fn done_results(&self) -> Vec<ConfigureResult> {
        self.lock()
            .iter()
            .filter_map(|n| match n {
                ConfigureNotification::Done(result) => Some(result.clone()),
                ConfigureNotification::Started => None,
            })
            .collect()
    }

    pub fn last_result(&self) -> Option<ConfigureResult> {
        self.done_results().pop()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ConfigureNotification>> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataTypeManagerObserver for RecordingObserver {
    fn on_configure_start(&mut self) {
        self.lock().push(ConfigureNotification::Started);
    }

    fn on_configure_done(&mut self, result: &ConfigureResult) {
        self.lock()
            .push(ConfigureNotification::Done(result.clone()));
    }
}
