pub mod config;
pub mod configurer;
pub mod context;
pub mod controller;
pub mod data_type;
pub mod encryption;
pub mod manager;
pub mod metrics;
pub mod prioritizer;
pub mod status_table;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, AccountConfig, Config, ConfigError,
    ControllerScenario, ScenarioConfig,
};
pub use configurer::{ConfigureParams, DataTypeConfigurer};
pub use context::{ConfigureContext, ConfigureReason, SyncMode};
pub use controller::{
    ActivationResponse, BoxedController, ControllerMap, ControllerState, DataTypeController,
    EngineActivation, PreconditionState, SyncStopMetadataFate,
};
pub use data_type::{DataType, DataTypeSet, Priority};
pub use encryption::DataTypeEncryptionHandler;
pub use manager::{
    BroadcastObserver, ConfigureNotification, ConfigureResult, ConfigureStatus, ConfigureTicket,
    DataTypeManager, DataTypeManagerObserver, ManagerConfig, ManagerError, ManagerHandle,
    ManagerState, ModelLoadCallback, ReadyCallback, StopCallback,
};
pub use prioritizer::prioritize_types;
pub use status_table::{DataTypeStatusTable, ErrorKind, SyncError, TypeErrorMap};
