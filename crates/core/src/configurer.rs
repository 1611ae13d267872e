//! The download/purge engine as seen by the manager.

use crate::context::ConfigureReason;
use crate::controller::EngineActivation;
use crate::data_type::{DataType, DataTypeSet};
use crate::manager::ReadyCallback;

/// One configuration batch handed to the engine.
#[derive(Debug)]
pub struct ConfigureParams {
    pub reason: ConfigureReason,
    /// Types whose initial data must be downloaded.
    pub to_download: DataTypeSet,
    /// Types whose local sync state must be reclaimed.
    pub to_purge: DataTypeSet,
    pub is_sync_feature_enabled: bool,
    /// Must be run exactly once when the batch has been applied.
    pub ready: ReadyCallback,
}

/// Performs downloads and purges on behalf of the manager.
pub trait DataTypeConfigurer: Send {
    /// Applies one batch. Completion is reported through `params.ready`,
    /// never by calling back into the manager directly.
    fn configure_data_types(&mut self, params: ConfigureParams);

    /// Routes an activated type's changes through the engine.
    fn connect_data_type(&mut self, data_type: DataType, activation: EngineActivation);

    /// No-op if the type is not connected.
    fn disconnect_data_type(&mut self, data_type: DataType);
}
