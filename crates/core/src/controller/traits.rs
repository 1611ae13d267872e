//! Trait implemented by every per data type controller.

use crate::context::ConfigureContext;
use crate::data_type::DataType;
use crate::manager::{ModelLoadCallback, StopCallback};

use super::types::{ActivationResponse, ControllerState, PreconditionState, SyncStopMetadataFate};

/// Owns the local model of one data type and its connection to the engine.
///
/// The manager only reads the controller state; transitions are driven by
/// the controller itself in response to the calls below.
pub trait DataTypeController: Send {
    /// The data type this controller is responsible for.
    fn data_type(&self) -> DataType;

    fn state(&self) -> ControllerState;

    fn precondition_state(&self) -> PreconditionState;

    /// Whether the type may run while sync runs in transport-only mode.
    fn should_run_in_transport_only_mode(&self) -> bool {
        false
    }

    /// Starts loading the local model. Only called in `NotRunning`.
    ///
    /// The controller moves to `ModelLoading` and must eventually run `done`,
    /// having moved to `ModelLoaded` on success or `Failed` on error.
    fn load_models(&mut self, context: &ConfigureContext, done: ModelLoadCallback);

    /// Connects a controller in `ModelLoaded`. Afterwards it must report
    /// `Running`.
    fn connect(&mut self) -> ActivationResponse;

    /// Stops the controller. Valid in every state.
    ///
    /// The controller may report `Stopping` for a while. Once it is
    /// `NotRunning` (or `Failed`) it must run `done`.
    fn stop(&mut self, fate: SyncStopMetadataFate, done: StopCallback);
}
