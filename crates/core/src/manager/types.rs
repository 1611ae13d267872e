//! Types for the data type manager.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::ControllerState;
use crate::data_type::{DataType, DataTypeSet};
use crate::status_table::DataTypeStatusTable;

/// State of the configuration state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// No configuration active. Initial state.
    #[default]
    Stopped,
    /// Loading models or waiting for batches to complete.
    Configuring,
    /// All batches applied.
    Configured,
    /// Transient while `stop()` runs.
    Stopping,
    /// Transient while a deferred reconfiguration restarts.
    Retrying,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Stopped => "stopped",
            ManagerState::Configuring => "configuring",
            ManagerState::Configured => "configured",
            ManagerState::Stopping => "stopping",
            ManagerState::Retrying => "retrying",
        };
        f.write_str(name)
    }
}

/// Outcome of a configuration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigureStatus {
    /// Every batch was applied.
    Ok,
    /// The cycle was abandoned by `stop()`.
    Aborted,
}

impl fmt::Display for ConfigureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigureStatus::Ok => f.write_str("ok"),
            ConfigureStatus::Aborted => f.write_str("aborted"),
        }
    }
}

/// Reported to observers when a configuration cycle ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureResult {
    pub status: ConfigureStatus,
    /// The preferred types of the most recent request.
    pub requested_types: DataTypeSet,
    pub status_table: DataTypeStatusTable,
}

/// Errors returned by the manager's entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// Operation not valid in the current state.
    #[error("invalid manager state: expected {expected}, got {actual}")]
    InvalidState {
        expected: ManagerState,
        actual: ManagerState,
    },

    /// `configure()` called before `set_configurer()`.
    #[error("no configurer set")]
    NoConfigurer,

    /// Account or client identity changed while running.
    #[error("configure context mismatch: {field} changed while running")]
    ContextMismatch { field: &'static str },

    /// Request carried `ConfigureReason::Unknown`.
    #[error("configure reason must be set")]
    UnknownReason,

    /// Two controllers for the same type.
    #[error("duplicate controller for {0}")]
    DuplicateController(DataType),

    /// Control types are handled by the engine and have no controller.
    #[error("control type {0} cannot have a controller")]
    ControlTypeController(DataType),

    /// A controller was not idle when handed to the manager.
    #[error("controller for {data_type} is {state}, expected not_running or failed")]
    UnexpectedControllerState {
        data_type: DataType,
        state: ControllerState,
    },
}
