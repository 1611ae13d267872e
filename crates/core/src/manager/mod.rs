//! Data type manager.
//!
//! The manager drives the preferred data types to a configured state:
//! - **Model load**: every enabled controller loads its local model
//! - **Connect**: loaded controllers are activated against the engine
//! - **Batches**: types are downloaded and purged in priority order, one
//!   batch at a time
//!
//! Failures are contained per type and recorded in the status table; the
//! remaining types keep running.

mod config;
mod handle;
mod model_load;
mod observer;
mod runner;
mod types;

pub use config::ManagerConfig;
pub use handle::{ConfigureTicket, ManagerHandle, ModelLoadCallback, ReadyCallback, StopCallback};
pub use observer::{BroadcastObserver, ConfigureNotification, DataTypeManagerObserver};
pub use runner::DataTypeManager;
pub use types::{ConfigureResult, ConfigureStatus, ManagerError, ManagerState};
