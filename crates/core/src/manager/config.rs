//! Data type manager configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the data type manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Record prometheus metrics for configuration cycles.
    #[serde(default = "default_record_metrics")]
    pub record_metrics: bool,

    /// Buffer size of the broadcast channel used for configure notifications.
    /// Slow subscribers lag behind and miss notifications beyond this.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_record_metrics() -> bool {
    true
}

fn default_notification_capacity() -> usize {
    64
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            record_metrics: default_record_metrics(),
            notification_capacity: default_notification_capacity(),
        }
    }
}
