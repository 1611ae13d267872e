//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every collaborator of the
//! data type manager, allowing the full configuration flow to be exercised
//! without a real engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use typesync_core::testing::{fixtures, MockController};
//!
//! let mut harness = fixtures::Harness::new(vec![
//!     MockController::new(DataType::Bookmarks),
//!     MockController::new(DataType::Passwords),
//! ])?;
//!
//! harness.configure(DataTypeSet::from([DataType::Bookmarks]))?;
//! harness.complete_all_batches();
//! assert_eq!(harness.manager.state(), ManagerState::Configured);
//! ```

mod mock_configurer;
mod mock_controller;
mod mock_encryption;
mod recording_observer;

pub use mock_configurer::{MockConfigurer, RecordedBatch};
pub use mock_controller::MockController;
pub use mock_encryption::MockEncryptionHandler;
pub use recording_observer::RecordingObserver;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;

    use tokio::sync::mpsc;

    use super::{MockConfigurer, MockController, MockEncryptionHandler, RecordingObserver};
    use crate::context::{ConfigureContext, ConfigureReason, SyncMode};
    use crate::controller::BoxedController;
    use crate::data_type::{DataType, DataTypeSet};
    use crate::manager::{
        DataTypeManager, ManagerConfig, ManagerError, ManagerHandle, StopCallback,
    };

    pub const ACCOUNT_ID: &str = "account@example.com";
    pub const CACHE_GUID: &str = "cache-guid-1";

    /// A context for the test account with the given reason.
    pub fn context(reason: ConfigureReason) -> ConfigureContext {
        ConfigureContext::new(reason, ACCOUNT_ID, CACHE_GUID, SyncMode::Full)
    }

    /// A stop callback whose manager is gone. Running it only logs.
    pub fn detached_stop_callback(data_type: DataType) -> StopCallback {
        let (tx, _rx) = mpsc::unbounded_channel();
        StopCallback::new(ManagerHandle::new(tx), data_type)
    }

    /// A context for the first configuration of a new client.
    pub fn new_client_context() -> ConfigureContext {
        context(ConfigureReason::NewClient)
    }

    /// A manager wired to mocks, with the mocks kept for assertions.
    pub struct Harness {
        pub manager: DataTypeManager,
        pub configurer: MockConfigurer,
        pub encryption: MockEncryptionHandler,
        pub observer: RecordingObserver,
        pub controllers: BTreeMap<DataType, MockController>,
    }

    impl Harness {
        /// Build a manager with a manually completed configurer.
        pub fn new(controllers: Vec<MockController>) -> Result<Self, ManagerError> {
            Self::with_configurer(controllers, MockConfigurer::new())
        }

        pub fn with_configurer(
            controllers: Vec<MockController>,
            configurer: MockConfigurer,
        ) -> Result<Self, ManagerError> {
            let encryption = MockEncryptionHandler::new();
            let observer = RecordingObserver::new();
            let boxed: Vec<BoxedController> = controllers
                .iter()
                .map(|c| Box::new(c.clone()) as BoxedController)
                .collect();

            let config = ManagerConfig {
                record_metrics: false,
                ..ManagerConfig::default()
            };
            let mut manager = DataTypeManager::new(
                config,
                boxed,
                Box::new(encryption.clone()),
                Box::new(observer.clone()),
            )?;
            manager.set_configurer(Box::new(configurer.clone()))?;

            let controllers = controllers
                .into_iter()
                .map(|c| (crate::controller::DataTypeController::data_type(&c), c))
                .collect();

            Ok(Self {
                manager,
                configurer,
                encryption,
                observer,
                controllers,
            })
        }

        /// The mock registered for `data_type`.
        pub fn controller(&self, data_type: DataType) -> Option<&MockController> {
            self.controllers.get(&data_type)
        }

        /// Configure `types` for a new client.
        pub fn configure(&mut self, types: DataTypeSet) -> Result<(), ManagerError> {
            self.manager.configure(types, new_client_context())
        }

        /// Complete pending batches until the configurer is idle. Returns the
        /// number of batches completed.
        pub fn complete_all_batches(&mut self) -> usize {
            let mut completed = 0;
            while self.configurer.complete_next() {
                self.manager.run_until_idle();
                completed += 1;
            }
            completed
        }
    }
}
