//! Types shared between the manager and data type controllers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a data type controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    NotRunning,
    ModelLoading,
    ModelLoaded,
    Running,
    Stopping,
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::NotRunning => "not_running",
            ControllerState::ModelLoading => "model_loading",
            ControllerState::ModelLoaded => "model_loaded",
            ControllerState::Running => "running",
            ControllerState::Stopping => "stopping",
            ControllerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Gate reported by a controller, independent of download mechanics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionState {
    #[default]
    Met,
    /// The type must not run and its local data must be cleared (policy).
    MustStopAndClearData,
    /// The type must not run yet, but its local data is kept.
    MustStopAndKeepData,
}

/// What happens to persisted sync metadata when a controller stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStopMetadataFate {
    KeepMetadata,
    ClearMetadata,
}

/// Connection details for a type that syncs through the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineActivation {
    /// The type finished its initial download in an earlier session.
    pub initial_sync_done: bool,
}

/// Result of connecting a controller whose model finished loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationResponse {
    /// The type syncs through the engine and takes part in download batches.
    Engine(EngineActivation),
    /// The type has its own channel to the server. It is active as soon as
    /// it is connected and never enters a download batch.
    Proxy,
}
