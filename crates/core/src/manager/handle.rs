//! Events posted to the manager's sequence and the handles that post them.
//!
//! Every asynchronous completion travels back to the manager as a
//! [`ManagerEvent`] on one unbounded channel. Completions carry the epoch
//! they were issued in; `stop()` bumps the epoch, so anything issued before
//! it is dropped on arrival.

use tokio::sync::mpsc;

use crate::context::ConfigureContext;
use crate::controller::SyncStopMetadataFate;
use crate::data_type::{DataType, DataTypeSet};
use crate::status_table::SyncError;

/// Identifies one batch handed to the configurer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigureTicket {
    pub(crate) epoch: u64,
    pub(crate) serial: u64,
}

#[derive(Debug)]
pub(crate) enum ManagerEvent {
    Configure {
        preferred_types: DataTypeSet,
        context: ConfigureContext,
    },
    Stop(SyncStopMetadataFate),
    PreconditionChanged(DataType),
    ControllerStopped(DataType),
    ModelLoaded {
        epoch: u64,
        data_type: DataType,
        result: Result<(), SyncError>,
    },
    AllModelsReady {
        epoch: u64,
        round: u64,
    },
    ConfigurationCompleted {
        ticket: ConfigureTicket,
        succeeded: DataTypeSet,
        failed: DataTypeSet,
    },
    ProcessReconfigure {
        epoch: u64,
    },
}

/// Handle for posting requests to a manager.
///
/// This is cheaply cloneable and can be shared across tasks. Requests are
/// processed in post order on the manager's sequence. If the manager is gone
/// the request is logged and dropped.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<ManagerEvent>,
}

impl ManagerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn post(&self, event: ManagerEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!("Dropping manager event, manager is gone: {:?}", e.0);
        }
    }

    /// Request a configuration of `preferred_types`.
    pub fn configure(&self, preferred_types: DataTypeSet, context: ConfigureContext) {
        self.post(ManagerEvent::Configure {
            preferred_types,
            context,
        });
    }

    /// Request that every data type is stopped.
    pub fn stop(&self, fate: SyncStopMetadataFate) {
        self.post(ManagerEvent::Stop(fate));
    }

    /// Report that the preconditions of `data_type` changed.
    pub fn data_type_precondition_changed(&self, data_type: DataType) {
        self.post(ManagerEvent::PreconditionChanged(data_type));
    }
}

/// One-shot completion for a configuration batch.
#[derive(Debug)]
pub struct ReadyCallback {
    handle: ManagerHandle,
    ticket: ConfigureTicket,
}

impl ReadyCallback {
    pub(crate) fn new(handle: ManagerHandle, ticket: ConfigureTicket) -> Self {
        Self { handle, ticket }
    }

    pub fn ticket(&self) -> ConfigureTicket {
        self.ticket
    }

    /// Report the batch as applied. `succeeded` are the types whose initial
    /// download just completed, `failed` the types the engine gave up on.
    pub fn run(self, succeeded: DataTypeSet, failed: DataTypeSet) {
        self.handle.post(ManagerEvent::ConfigurationCompleted {
            ticket: self.ticket,
            succeeded,
            failed,
        });
    }
}

/// One-shot completion for a controller's model load.
#[derive(Debug)]
pub struct ModelLoadCallback {
    handle: ManagerHandle,
    epoch: u64,
    data_type: DataType,
}

impl ModelLoadCallback {
    pub(crate) fn new(handle: ManagerHandle, epoch: u64, data_type: DataType) -> Self {
        Self {
            handle,
            epoch,
            data_type,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Report the load as finished, successfully or with an error.
    pub fn run(self, result: Result<(), SyncError>) {
        self.handle.post(ManagerEvent::ModelLoaded {
            epoch: self.epoch,
            data_type: self.data_type,
            result,
        });
    }
}

/// One-shot completion for a controller stop.
///
/// Carries no epoch: a controller that finished stopping is reusable no
/// matter which configuration asked it to stop.
#[derive(Debug)]
pub struct StopCallback {
    handle: ManagerHandle,
    data_type: DataType,
}

impl StopCallback {
    pub(crate) fn new(handle: ManagerHandle, data_type: DataType) -> Self {
        Self { handle, data_type }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Report that the controller left `Stopping`.
    pub fn run(self) {
        self.handle
            .post(ManagerEvent::ControllerStopped(self.data_type));
    }
}
