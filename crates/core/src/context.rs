//! Per-request configuration context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a configuration was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigureReason {
    /// Placeholder; never valid for an actual request.
    #[default]
    Unknown,
    /// The user changed the set of preferred types.
    Reconfiguration,
    /// Types are being purged and redownloaded after a server migration.
    Migration,
    /// First configuration for a new sync client.
    NewClient,
    /// A data type was newly enabled.
    NewlyEnabledDataType,
    /// Cryptographer state changed.
    Crypto,
    /// Triggered internally, e.g. by a precondition change.
    Programmatic,
}

impl ConfigureReason {
    /// Reason to use for an internally triggered reconfiguration.
    ///
    /// A reconfiguration that happens during the very first configuration
    /// cycle keeps the `NewClient` reason.
    pub fn for_programmatic_reconfigure(self) -> Self {
        if self == ConfigureReason::NewClient {
            ConfigureReason::NewClient
        } else {
            ConfigureReason::Programmatic
        }
    }

    /// Whether this reason was caused directly by the user.
    pub fn is_user_triggered(self) -> bool {
        matches!(
            self,
            ConfigureReason::Reconfiguration
                | ConfigureReason::NewClient
                | ConfigureReason::NewlyEnabledDataType
        )
    }
}

impl fmt::Display for ConfigureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigureReason::Unknown => "unknown",
            ConfigureReason::Reconfiguration => "reconfiguration",
            ConfigureReason::Migration => "migration",
            ConfigureReason::NewClient => "new_client",
            ConfigureReason::NewlyEnabledDataType => "newly_enabled_data_type",
            ConfigureReason::Crypto => "crypto",
            ConfigureReason::Programmatic => "programmatic",
        };
        f.write_str(name)
    }
}

/// Whether sync runs as a full feature or in transport-only mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Full,
    TransportOnly,
}

/// Immutable description of one configuration request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureContext {
    pub reason: ConfigureReason,
    /// Account the engine is signed in with.
    pub authenticated_account_id: String,
    /// Identifier of the local sync client.
    pub cache_guid: String,
    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl ConfigureContext {
    pub fn new(
        reason: ConfigureReason,
        authenticated_account_id: impl Into<String>,
        cache_guid: impl Into<String>,
        sync_mode: SyncMode,
    ) -> Self {
        Self {
            reason,
            authenticated_account_id: authenticated_account_id.into(),
            cache_guid: cache_guid.into(),
            sync_mode,
        }
    }

    /// Same context with a different reason.
    pub fn with_reason(mut self, reason: ConfigureReason) -> Self {
        self.reason = reason;
        self
    }
}
