use serde::{Deserialize, Serialize};

use crate::context::{ConfigureContext, ConfigureReason, SyncMode};
use crate::controller::PreconditionState;
use crate::data_type::{DataType, DataTypeSet};
use crate::manager::ManagerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

/// Account the manager configures for
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    #[serde(default = "default_account_id")]
    pub account_id: String,
    /// Identifies this client's sync cache. A fresh one is generated when
    /// absent.
    #[serde(default = "default_cache_guid")]
    pub cache_guid: String,
    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            cache_guid: default_cache_guid(),
            sync_mode: SyncMode::default(),
        }
    }
}

impl AccountConfig {
    /// Context for a configuration request with `reason`.
    pub fn context(&self, reason: ConfigureReason) -> ConfigureContext {
        ConfigureContext::new(
            reason,
            self.account_id.clone(),
            self.cache_guid.clone(),
            self.sync_mode,
        )
    }
}

fn default_account_id() -> String {
    "local-account".to_string()
}

fn default_cache_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Simulated environment to run the manager against
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    /// Types requested by the user. Control types are always added.
    #[serde(default)]
    pub preferred_types: DataTypeSet,
    #[serde(default = "default_reason")]
    pub reason: ConfigureReason,
    /// Types whose data is encrypted.
    #[serde(default)]
    pub encrypted_types: DataTypeSet,
    /// Whether key material for encrypted types is missing.
    #[serde(default)]
    pub crypto_error: bool,
    /// Simulated time the engine takes to apply one batch.
    #[serde(default = "default_engine_latency_ms")]
    pub engine_latency_ms: u64,
    /// Types the engine fails to download.
    #[serde(default)]
    pub engine_failures: DataTypeSet,
    #[serde(default)]
    pub controllers: Vec<ControllerScenario>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            preferred_types: DataTypeSet::new(),
            reason: default_reason(),
            encrypted_types: DataTypeSet::new(),
            crypto_error: false,
            engine_latency_ms: default_engine_latency_ms(),
            engine_failures: DataTypeSet::new(),
            controllers: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    /// Types with a simulated controller.
    pub fn registered_types(&self) -> DataTypeSet {
        self.controllers.iter().map(|c| c.data_type).collect()
    }
}

fn default_reason() -> ConfigureReason {
    ConfigureReason::NewClient
}

fn default_engine_latency_ms() -> u64 {
    50
}

/// One simulated controller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerScenario {
    pub data_type: DataType,
    #[serde(default)]
    pub precondition: PreconditionState,
    /// Fail the model load with this message.
    #[serde(default)]
    pub fail_load: Option<String>,
    /// Bypass the engine when connected.
    #[serde(default)]
    pub proxy: bool,
    #[serde(default = "default_initial_sync_done")]
    pub initial_sync_done: bool,
    #[serde(default)]
    pub transport_only: bool,
    #[serde(default)]
    pub load_latency_ms: u64,
}

fn default_initial_sync_done() -> bool {
    true
}
