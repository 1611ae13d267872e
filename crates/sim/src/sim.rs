//! Simulated collaborators driven by a scenario.
//!
//! Controllers load their models and the engine applies batches on spawned
//! tokio tasks after configurable delays, posting completions back to the
//! manager the same way real collaborators would.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use typesync_core::{
    ActivationResponse, ConfigureContext, ConfigureParams, ControllerScenario, ControllerState,
    DataType, DataTypeConfigurer, DataTypeController, DataTypeEncryptionHandler, DataTypeSet,
    EngineActivation, ModelLoadCallback, PreconditionState, ScenarioConfig, StopCallback,
    SyncError, SyncStopMetadataFate,
};

/// Controller whose model load takes `load_latency_ms`.
#[derive(Debug, Clone)]
pub struct SimController {
    scenario: ControllerScenario,
    state: Arc<Mutex<ControllerState>>,
    /// Bumped on every stop so a load finishing afterwards is discarded.
    generation: Arc<Mutex<u64>>,
}

impl SimController {
    pub fn new(scenario: ControllerScenario) -> Self {
        Self {
            scenario,
            state: Arc::new(Mutex::new(ControllerState::NotRunning)),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    fn state_lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation_lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataTypeController for SimController {
    fn data_type(&self) -> DataType {
        self.scenario.data_type
    }

    fn state(&self) -> ControllerState {
        *self.state_lock()
    }

    fn precondition_state(&self) -> PreconditionState {
        self.scenario.precondition
    }

    fn should_run_in_transport_only_mode(&self) -> bool {
        self.scenario.transport_only
    }

    fn load_models(&mut self, context: &ConfigureContext, done: ModelLoadCallback) {
        let data_type = self.scenario.data_type;
        debug!(
            "Loading model for {} (reason {}, latency {}ms)",
            data_type, context.reason, self.scenario.load_latency_ms
        );
        *self.state_lock() = ControllerState::ModelLoading;

        let controller = self.clone();
        let generation = *self.generation_lock();
        let latency = Duration::from_millis(self.scenario.load_latency_ms);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if *controller.generation_lock() != generation {
                debug!("Model load for {} finished after stop, dropping", data_type);
                return;
            }
            let result = match &controller.scenario.fail_load {
                Some(message) => {
                    *controller.state_lock() = ControllerState::Failed;
                    Err(SyncError::fatal(data_type, message.clone()))
                }
                None => {
                    *controller.state_lock() = ControllerState::ModelLoaded;
                    Ok(())
                }
            };
            done.run(result);
        });
    }

    fn connect(&mut self) -> ActivationResponse {
        *self.state_lock() = ControllerState::Running;
        if self.scenario.proxy {
            ActivationResponse::Proxy
        } else {
            ActivationResponse::Engine(EngineActivation {
                initial_sync_done: self.scenario.initial_sync_done,
            })
        }
    }

    fn stop(&mut self, fate: SyncStopMetadataFate, done: StopCallback) {
        debug!("Stopping {} ({:?})", self.scenario.data_type, fate);
        *self.generation_lock() += 1;
        {
            let mut state = self.state_lock();
            if *state != ControllerState::Failed {
                *state = ControllerState::NotRunning;
            }
        }
        done.run();
    }
}

/// Engine that applies each batch after `latency` and fails `failures`.
#[derive(Debug, Clone)]
pub struct SimEngine {
    latency: Duration,
    failures: DataTypeSet,
    connected: DataTypeSet,
}

impl SimEngine {
    pub fn new(latency: Duration, failures: DataTypeSet) -> Self {
        Self {
            latency,
            failures,
            connected: DataTypeSet::new(),
        }
    }

    pub fn connected_types(&self) -> DataTypeSet {
        self.connected
    }
}

impl DataTypeConfigurer for SimEngine {
    fn configure_data_types(&mut self, params: ConfigureParams) {
        info!(
            "Engine applying batch: download {}, purge {} ({})",
            params.to_download, params.to_purge, params.reason
        );
        let latency = self.latency;
        let failed = params.to_download.intersection(self.failures);
        let succeeded = params.to_download.difference(failed);
        let ready = params.ready;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if !failed.is_empty() {
                warn!("Engine failed to download {}", failed);
            }
            ready.run(succeeded, failed);
        });
    }

    fn connect_data_type(&mut self, data_type: DataType, activation: EngineActivation) {
        debug!(
            "Engine connected {} (initial sync done: {})",
            data_type, activation.initial_sync_done
        );
        self.connected.put(data_type);
    }

    fn disconnect_data_type(&mut self, data_type: DataType) {
        if self.connected.has(data_type) {
            debug!("Engine disconnected {}", data_type);
            self.connected.remove(data_type);
        }
    }
}

/// Encryption state fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct SimEncryption {
    crypto_error: bool,
    encrypted_types: DataTypeSet,
}

impl SimEncryption {
    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        Self {
            crypto_error: scenario.crypto_error,
            encrypted_types: scenario.encrypted_types,
        }
    }
}

impl DataTypeEncryptionHandler for SimEncryption {
    fn has_crypto_error(&self) -> bool {
        self.crypto_error
    }

    fn encrypted_data_types(&self) -> DataTypeSet {
        self.encrypted_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesync_core::testing::fixtures;

    fn scenario(data_type: DataType) -> ControllerScenario {
        ControllerScenario {
            data_type,
            precondition: PreconditionState::Met,
            fail_load: None,
            proxy: false,
            initial_sync_done: true,
            transport_only: false,
            load_latency_ms: 0,
        }
    }

    #[test]
    fn test_connect_reports_activation() {
        let mut controller = SimController::new(ControllerScenario {
            initial_sync_done: false,
            ..scenario(DataType::Bookmarks)
        });
        assert_eq!(
            controller.connect(),
            ActivationResponse::Engine(EngineActivation {
                initial_sync_done: false
            })
        );
        assert_eq!(controller.state(), ControllerState::Running);

        let mut proxy = SimController::new(ControllerScenario {
            proxy: true,
            ..scenario(DataType::Sessions)
        });
        assert_eq!(proxy.connect(), ActivationResponse::Proxy);
    }

    #[test]
    fn test_stop_keeps_failed_state() {
        let mut controller = SimController::new(scenario(DataType::Bookmarks));
        *controller.state_lock() = ControllerState::Failed;
        controller.stop(
            SyncStopMetadataFate::ClearMetadata,
            fixtures::detached_stop_callback(DataType::Bookmarks),
        );
        assert_eq!(controller.state(), ControllerState::Failed);
    }

    #[test]
    fn test_engine_tracks_connections() {
        let mut engine = SimEngine::new(Duration::ZERO, DataTypeSet::new());
        engine.connect_data_type(DataType::Bookmarks, EngineActivation::default());
        assert_eq!(
            engine.connected_types(),
            DataTypeSet::from([DataType::Bookmarks])
        );
        engine.disconnect_data_type(DataType::Bookmarks);
        engine.disconnect_data_type(DataType::Passwords);
        assert!(engine.connected_types().is_empty());
    }

    #[test]
    fn test_encryption_from_scenario() {
        let scenario = ScenarioConfig {
            crypto_error: true,
            encrypted_types: DataTypeSet::from([DataType::Passwords]),
            ..ScenarioConfig::default()
        };
        let encryption = SimEncryption::from_scenario(&scenario);
        assert!(encryption.has_crypto_error());
        assert_eq!(
            encryption.encrypted_data_types(),
            DataTypeSet::from([DataType::Passwords])
        );
    }
}
