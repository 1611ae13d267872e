//! Per data type controllers.
//!
//! A controller owns the local model of one data type. The manager drives it
//! through `NotRunning -> ModelLoading -> ModelLoaded -> Running` and stops it
//! when the type is no longer wanted or allowed.

mod map;
mod traits;
mod types;

pub use map::{BoxedController, ControllerMap};
pub use traits::DataTypeController;
pub use types::{
    ActivationResponse, ControllerState, EngineActivation, PreconditionState,
    SyncStopMetadataFate,
};
