//! Data type manager implementation.
//!
//! Drives the set of preferred data types from `Stopped` to `Configured`:
//! - Restart: fold controller, crypto and precondition failures into the
//!   status table, then load models for the types without errors
//! - Connect: activate every type whose model finished loading
//! - Batches: hand prioritized batches to the configurer, one at a time
//!
//! Everything runs on one sequence. Completions arrive as events on the
//! manager's channel and are checked against the current epoch before they
//! are applied.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::configurer::{ConfigureParams, DataTypeConfigurer};
use crate::context::{ConfigureContext, ConfigureReason, SyncMode};
use crate::controller::{
    ActivationResponse, BoxedController, ControllerMap, ControllerState, PreconditionState,
    SyncStopMetadataFate,
};
use crate::data_type::{commit_only_types, control_types, DataType, DataTypeSet};
use crate::encryption::DataTypeEncryptionHandler;
use crate::metrics;
use crate::prioritizer::prioritize_types;
use crate::status_table::{DataTypeStatusTable, ErrorKind, SyncError, TypeErrorMap};

use super::config::ManagerConfig;
use super::handle::{ConfigureTicket, ManagerEvent, ManagerHandle, ReadyCallback, StopCallback};
use super::model_load::ModelLoadManager;
use super::observer::DataTypeManagerObserver;
use super::types::{ConfigureResult, ConfigureStatus, ManagerError, ManagerState};

/// Classification of every data type for the batch at the head of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BatchClassification {
    fatal: DataTypeSet,
    crypto: DataTypeSet,
    unready: DataTypeSet,
    /// Enabled and part of this batch.
    active: DataTypeSet,
    /// Enabled but waiting for a later batch.
    inactive: DataTypeSet,
    /// Everything that is not enabled.
    disabled: DataTypeSet,
}

/// Orchestrates which data types run, in what order they are configured, and
/// how failures are contained.
pub struct DataTypeManager {
    config: ManagerConfig,
    controllers: ControllerMap,
    encryption: Box<dyn DataTypeEncryptionHandler>,
    observer: Box<dyn DataTypeManagerObserver>,
    configurer: Option<Box<dyn DataTypeConfigurer>>,
    model_load_manager: ModelLoadManager,
    status_table: DataTypeStatusTable,

    state: ManagerState,
    preferred_types: DataTypeSet,
    /// Snapshot of the enabled types taken at the last restart.
    preferred_types_without_errors: DataTypeSet,
    downloaded_types: DataTypeSet,
    force_redownload_types: DataTypeSet,
    configured_proxy_types: DataTypeSet,
    configuration_types_queue: VecDeque<DataTypeSet>,
    needs_reconfigure: bool,
    last_requested_context: ConfigureContext,
    last_restart_time: Option<DateTime<Utc>>,

    // Sequence state
    epoch: u64,
    next_batch_serial: u64,
    batch_in_flight: Option<ConfigureTicket>,
    handle: ManagerHandle,
    events: mpsc::UnboundedReceiver<ManagerEvent>,
}

impl DataTypeManager {
    /// Create a new manager in the `Stopped` state.
    ///
    /// Controllers must be `NotRunning` or `Failed`. Failed controllers are
    /// recorded as fatal errors right away.
    pub fn new(
        config: ManagerConfig,
        controllers: Vec<BoxedController>,
        encryption: Box<dyn DataTypeEncryptionHandler>,
        observer: Box<dyn DataTypeManagerObserver>,
    ) -> Result<Self, ManagerError> {
        let controllers = ControllerMap::new(controllers)?;

        let mut existing_errors = TypeErrorMap::new();
        for (data_type, controller) in controllers.iter() {
            match controller.state() {
                ControllerState::NotRunning => {}
                ControllerState::Failed => {
                    existing_errors.insert(
                        data_type,
                        SyncError::fatal(data_type, "Preexisting controller error on startup"),
                    );
                }
                state => {
                    return Err(ManagerError::UnexpectedControllerState { data_type, state });
                }
            }
        }
        let mut status_table = DataTypeStatusTable::new();
        status_table.update_failed_data_types(existing_errors);

        let (tx, events) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            controllers,
            encryption,
            observer,
            configurer: None,
            model_load_manager: ModelLoadManager::new(),
            status_table,
            state: ManagerState::Stopped,
            preferred_types: DataTypeSet::new(),
            preferred_types_without_errors: DataTypeSet::new(),
            downloaded_types: control_types(),
            force_redownload_types: DataTypeSet::new(),
            configured_proxy_types: DataTypeSet::new(),
            configuration_types_queue: VecDeque::new(),
            needs_reconfigure: false,
            last_requested_context: ConfigureContext::default(),
            last_restart_time: None,
            epoch: 0,
            next_batch_serial: 0,
            batch_in_flight: None,
            handle: ManagerHandle::new(tx),
            events,
        })
    }

    /// Handle for posting requests and completions to this manager.
    pub fn handle(&self) -> ManagerHandle {
        self.handle.clone()
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Replace the engine connection. Only valid while stopped.
    ///
    /// Resets every piece of state that could otherwise survive a
    /// stop/start cycle, including the status table.
    pub fn set_configurer(
        &mut self,
        configurer: Box<dyn DataTypeConfigurer>,
    ) -> Result<(), ManagerError> {
        self.expect_state(ManagerState::Stopped)?;
        debug_assert!(self.configured_proxy_types.is_empty());
        debug_assert!(self.configuration_types_queue.is_empty());

        self.configurer = Some(configurer);
        self.last_requested_context = ConfigureContext::default();
        self.downloaded_types = control_types();
        self.force_redownload_types.clear();
        self.needs_reconfigure = false;
        self.reset_data_type_errors();
        Ok(())
    }

    /// Request that `preferred_types` (plus control types) be configured.
    ///
    /// While a configuration is in flight the request is deferred until the
    /// current batch completes.
    pub fn configure(
        &mut self,
        preferred_types: DataTypeSet,
        context: ConfigureContext,
    ) -> Result<(), ManagerError> {
        let result = self.configure_internal(preferred_types, context);
        self.run_until_idle();
        result
    }

    /// Stop every data type and abandon any configuration in flight.
    pub fn stop(&mut self, fate: SyncStopMetadataFate) {
        self.stop_internal(fate);
        self.run_until_idle();
    }

    /// React to a controller reporting that its preconditions changed.
    pub fn data_type_precondition_changed(&mut self, data_type: DataType) {
        self.precondition_changed_internal(data_type);
        self.run_until_idle();
    }

    /// Reconfigure the current preferred types as soon as possible.
    pub fn force_reconfiguration(&mut self) {
        self.force_reconfiguration_internal();
        self.run_until_idle();
    }

    /// Drop every recorded data type error.
    pub fn reset_data_type_errors(&mut self) {
        self.status_table.reset();
    }

    /// Reconfigure without `undesired_types` so their data gets purged.
    pub fn purge_for_migration(&mut self, undesired_types: DataTypeSet) -> Result<(), ManagerError> {
        if self.configurer.is_none() {
            return Err(ManagerError::NoConfigurer);
        }
        let remainder = self.preferred_types.difference(undesired_types);
        let context = self
            .last_requested_context
            .clone()
            .with_reason(ConfigureReason::Migration);
        let result = self.configure_impl(remainder, context);
        self.run_until_idle();
        result
    }

    /// Clear sync metadata of every controller not in `types`. Only valid
    /// while stopped.
    pub fn clear_metadata_while_stopped_except_for(
        &mut self,
        types: DataTypeSet,
    ) -> Result<(), ManagerError> {
        self.expect_state(ManagerState::Stopped)?;
        for (data_type, controller) in self.controllers.iter_mut() {
            if !types.has(data_type) {
                controller.stop(
                    SyncStopMetadataFate::ClearMetadata,
                    StopCallback::new(self.handle.clone(), data_type),
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // Sequence
    // =========================================================================

    /// Process every event posted so far, including those posted while
    /// processing.
    pub fn run_until_idle(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    /// Process events until `shutdown` fires. Returns the manager so the
    /// caller can inspect or restart it.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Self {
        info!("Data type manager loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Data type manager loop received shutdown signal");
                    break;
                }
                event = self.events.recv() => {
                    // The manager keeps a sender, so the channel never closes.
                    let Some(event) = event else { break };
                    self.handle_event(event);
                }
            }
        }
        self
    }

    fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Configure {
                preferred_types,
                context,
            } => {
                if let Err(e) = self.configure_internal(preferred_types, context) {
                    error!("Posted configure request rejected: {}", e);
                }
            }
            ManagerEvent::Stop(fate) => self.stop_internal(fate),
            ManagerEvent::PreconditionChanged(data_type) => {
                self.precondition_changed_internal(data_type)
            }
            ManagerEvent::ControllerStopped(data_type) => {
                let error = self.model_load_manager.on_controller_stopped(
                    &mut self.controllers,
                    &self.handle,
                    data_type,
                );
                if let Some(error) = error {
                    self.on_single_data_type_will_stop(data_type, Some(error));
                }
            }
            ManagerEvent::ModelLoaded {
                epoch,
                data_type,
                result,
            } => {
                if epoch != self.epoch {
                    debug!("Dropping model load completion for {} from old epoch", data_type);
                    return;
                }
                let error = self.model_load_manager.on_model_loaded(
                    &mut self.controllers,
                    &self.handle,
                    epoch,
                    data_type,
                    result,
                );
                if let Some(error) = error {
                    self.on_single_data_type_will_stop(data_type, Some(error));
                }
            }
            ManagerEvent::AllModelsReady { epoch, round } => {
                if epoch != self.epoch
                    || round != self.model_load_manager.round()
                    || self.state != ManagerState::Configuring
                {
                    debug!("Dropping stale model readiness notification");
                    return;
                }
                self.on_all_data_types_ready_for_configure();
            }
            ManagerEvent::ConfigurationCompleted {
                ticket,
                succeeded,
                failed,
            } => {
                if self.batch_in_flight != Some(ticket) {
                    debug!("Dropping stale configuration completion {:?}", ticket);
                    return;
                }
                self.batch_in_flight = None;
                self.configuration_completed(succeeded, failed);
            }
            ManagerEvent::ProcessReconfigure { epoch } => {
                if epoch == self.epoch {
                    self.process_reconfigure();
                }
            }
        }
    }

    // =========================================================================
    // State machine
    // =========================================================================

    fn configure_internal(
        &mut self,
        mut preferred_types: DataTypeSet,
        context: ConfigureContext,
    ) -> Result<(), ManagerError> {
        if self.configurer.is_none() {
            return Err(ManagerError::NoConfigurer);
        }

        preferred_types.put_all(control_types());
        let allowed_types = control_types().union(self.controllers.types());
        self.configure_impl(preferred_types.intersection(allowed_types), context)
    }

    fn configure_impl(
        &mut self,
        preferred_types: DataTypeSet,
        context: ConfigureContext,
    ) -> Result<(), ManagerError> {
        if context.reason == ConfigureReason::Unknown {
            return Err(ManagerError::UnknownReason);
        }
        debug!(
            "Configuring for {} with reason {}",
            preferred_types, context.reason
        );

        if self.state == ManagerState::Stopping {
            error!("Configuration set while stopping");
            return Err(ManagerError::InvalidState {
                expected: ManagerState::Stopped,
                actual: ManagerState::Stopping,
            });
        }

        if self.state != ManagerState::Stopped {
            if context.authenticated_account_id
                != self.last_requested_context.authenticated_account_id
            {
                return Err(ManagerError::ContextMismatch {
                    field: "authenticated_account_id",
                });
            }
            if context.cache_guid != self.last_requested_context.cache_guid {
                return Err(ManagerError::ContextMismatch {
                    field: "cache_guid",
                });
            }
        }

        self.preferred_types = preferred_types;
        self.last_requested_context = context;

        match self.state {
            ManagerState::Stopped | ManagerState::Configured | ManagerState::Retrying => {
                self.restart();
            }
            ManagerState::Configuring => {
                debug!("Configuration in flight, postponing request until it completes");
                self.needs_reconfigure = true;
            }
            ManagerState::Stopping => unreachable!("rejected above"),
        }
        Ok(())
    }

    fn restart(&mut self) {
        debug!("Restarting configuration");
        let reason = self.last_requested_context.reason;

        if self.config.record_metrics && reason.is_user_triggered() {
            for data_type in self.preferred_types {
                metrics::CONFIGURE_DATA_TYPES
                    .with_label_values(&[data_type.as_str()])
                    .inc();
            }
        }

        // Controllers can fail while idle; nobody would report that otherwise.
        let failed_controllers: Vec<DataType> = self
            .controllers
            .iter()
            .filter(|(_, c)| c.state() == ControllerState::Failed)
            .map(|(data_type, _)| data_type)
            .collect();
        for data_type in failed_controllers {
            self.record_error(SyncError::fatal(
                data_type,
                "Preexisting controller error on configuration",
            ));
        }

        self.update_precondition_errors();

        // A type keeps whatever error it already has; crypto only marks the
        // rest.
        if self.encryption.has_crypto_error() {
            let mut encrypted_types = self.encryption.encrypted_data_types();
            encrypted_types.retain_all(self.preferred_types);
            encrypted_types.remove_all(self.status_table.failed_types());
            for data_type in encrypted_types {
                self.record_error(SyncError::crypto(data_type));
            }
        } else {
            self.status_table.reset_crypto_errors();
        }

        self.last_restart_time = Some(Utc::now());

        debug_assert!(matches!(
            self.state,
            ManagerState::Stopped | ManagerState::Configured | ManagerState::Retrying
        ));
        let old_state = self.state;
        self.state = ManagerState::Configuring;

        // Only a cycle that starts from a steady state announces itself.
        if matches!(old_state, ManagerState::Stopped | ManagerState::Configured) {
            self.observer.on_configure_start();
        }

        self.preferred_types_without_errors = self.enabled_types();
        self.configuration_types_queue = prioritize_types(self.preferred_types_without_errors);
        info!(
            "Configuration started: preferred {}, enabled {}, {} batch(es)",
            self.preferred_types,
            self.preferred_types_without_errors,
            self.configuration_types_queue.len()
        );

        let stopped = self.model_load_manager.configure(
            &mut self.controllers,
            &self.handle,
            self.epoch,
            self.preferred_types_without_errors,
            self.preferred_types,
            &self.last_requested_context,
        );
        for data_type in stopped {
            self.on_single_data_type_will_stop(data_type, None);
        }
    }

    fn on_all_data_types_ready_for_configure(&mut self) {
        // A request that arrived while models were loading wins; errors
        // recorded during the load stay in the status table.
        if self.needs_reconfigure {
            self.configuration_types_queue.clear();
            self.process_reconfigure();
            return;
        }

        self.connect_data_types();
        self.start_next_configuration();
    }

    fn connect_data_types(&mut self) {
        for data_type in self.preferred_types_without_errors {
            let Some(controller) = self.controllers.get_mut(data_type) else {
                continue;
            };
            if controller.state() != ControllerState::ModelLoaded {
                continue;
            }
            debug_assert!(!self.status_table.failed_types().has(data_type));

            let response = controller.connect();
            if controller.state() != ControllerState::Running {
                warn!(
                    "{} reported {} after connect, expected running",
                    data_type,
                    controller.state()
                );
                self.record_error(SyncError::fatal(data_type, "Controller failed to connect"));
                self.needs_reconfigure = true;
                continue;
            }

            match response {
                ActivationResponse::Proxy => {
                    // Syncs through its own channel; never enters a batch.
                    self.downloaded_types.put(data_type);
                    self.configured_proxy_types.put(data_type);
                    self.force_redownload_types.remove(data_type);
                }
                ActivationResponse::Engine(activation) => {
                    if activation.initial_sync_done
                        && !self.force_redownload_types.has(data_type)
                    {
                        self.downloaded_types.put(data_type);
                    } else {
                        self.downloaded_types.remove(data_type);
                    }
                    if let Some(configurer) = self.configurer.as_mut() {
                        configurer.connect_data_type(data_type, activation);
                    }
                }
            }
        }
    }

    fn start_next_configuration(&mut self) {
        if self.configuration_types_queue.is_empty() {
            return;
        }
        let Some(params) = self.prepare_configure_params() else {
            return;
        };
        if self.config.record_metrics {
            metrics::CONFIGURE_BATCHES.inc();
        }
        if let Some(configurer) = self.configurer.as_mut() {
            configurer.configure_data_types(params);
        }
    }

    fn classify_batch(&self, batch: DataTypeSet) -> BatchClassification {
        let enabled = self.enabled_types();
        BatchClassification {
            fatal: self.status_table.fatal_error_types(),
            crypto: self.status_table.crypto_error_types(),
            // Unready types only count as unready while still preferred.
            unready: self
                .status_table
                .unready_error_types()
                .intersection(self.preferred_types),
            active: enabled.intersection(batch),
            inactive: enabled.difference(batch),
            disabled: DataTypeSet::all().difference(enabled),
        }
    }

    fn prepare_configure_params(&mut self) -> Option<ConfigureParams> {
        let batch = *self.configuration_types_queue.front()?;
        let classes = self.classify_batch(batch);
        debug_assert!(classes.active.intersection(classes.disabled).is_empty());
        debug_assert!(classes
            .disabled
            .has_all(classes.fatal.union(classes.crypto).union(classes.unready)));

        let mut to_download = classes.active.difference(self.downloaded_types);
        to_download.remove_all(commit_only_types());
        if !to_download.is_empty() {
            to_download.put_all(control_types());
        }

        // A disabled type that comes back must be downloaded again.
        self.downloaded_types.remove_all(classes.disabled);
        self.force_redownload_types.remove_all(to_download);

        let to_purge = DataTypeSet::all()
            .difference(self.downloaded_types)
            .difference(classes.active)
            .difference(classes.inactive)
            .difference(classes.unready);
        debug_assert!(classes.active.intersection(to_purge).is_empty());
        debug_assert!(self.downloaded_types.intersection(classes.crypto).is_empty());

        let ticket = ConfigureTicket {
            epoch: self.epoch,
            serial: self.next_batch_serial,
        };
        self.next_batch_serial += 1;
        self.batch_in_flight = Some(ticket);

        info!(
            "Configuring batch {}: download {}, purge {}",
            batch, to_download, to_purge
        );

        Some(ConfigureParams {
            reason: self.last_requested_context.reason,
            to_download,
            to_purge,
            is_sync_feature_enabled: self.last_requested_context.sync_mode == SyncMode::Full,
            ready: ReadyCallback::new(self.handle.clone(), ticket),
        })
    }

    fn configuration_completed(&mut self, succeeded: DataTypeSet, failed: DataTypeSet) {
        if self.state != ManagerState::Configuring {
            warn!(
                "Configuration completed in state {}, ignoring",
                self.state
            );
            return;
        }

        // Types whose initial sync just completed.
        self.downloaded_types.put_all(succeeded);

        if !failed.is_empty() {
            warn!("Engine failed to configure {}", failed);
            for data_type in failed {
                self.record_error(SyncError::fatal(
                    data_type,
                    "Backend failed to download and configure type.",
                ));
            }
            self.needs_reconfigure = true;
        }

        if self.needs_reconfigure {
            self.configuration_types_queue.clear();
            self.process_reconfigure();
            return;
        }

        self.configuration_types_queue.pop_front();
        if self.configuration_types_queue.is_empty() {
            self.state = ManagerState::Configured;
            self.notify_done(ConfigureStatus::Ok);
            return;
        }

        self.start_next_configuration();
    }

    fn process_reconfigure(&mut self) {
        // Posted continuations may arrive after the request was served.
        if !self.needs_reconfigure {
            return;
        }
        // Wait for the batch in flight.
        if !self.configuration_types_queue.is_empty() {
            return;
        }
        if matches!(self.state, ManagerState::Stopped | ManagerState::Stopping) {
            return;
        }

        debug!("Reconfiguring due to a request that arrived while busy");
        if self.config.record_metrics {
            metrics::RECONFIGURATIONS.inc();
        }

        // Restart synchronously so purging sees the failed types as they are
        // now. A cycle that never reached a steady state must not announce
        // itself twice.
        if self.state == ManagerState::Configuring {
            self.state = ManagerState::Retrying;
        }
        self.needs_reconfigure = false;
        let context = self.last_requested_context.clone();
        if let Err(e) = self.configure_impl(self.preferred_types, context) {
            error!("Reconfiguration failed: {}", e);
        }
    }

    fn force_reconfiguration_internal(&mut self) {
        if matches!(self.state, ManagerState::Stopped | ManagerState::Stopping) {
            debug!("Ignoring reconfiguration request while {}", self.state);
            return;
        }
        self.needs_reconfigure = true;
        self.last_requested_context.reason = self
            .last_requested_context
            .reason
            .for_programmatic_reconfigure();
        self.process_reconfigure();
    }

    fn precondition_changed_internal(&mut self, data_type: DataType) {
        if !self.update_precondition_error(data_type) {
            return;
        }

        // Preconditions may change at any time; nothing to react to.
        if matches!(self.state, ManagerState::Stopped | ManagerState::Stopping) {
            return;
        }

        let Some(precondition) = self
            .controllers
            .get(data_type)
            .map(|c| c.precondition_state())
        else {
            return;
        };

        match precondition {
            PreconditionState::Met => {
                // Reconfiguring also refreshes the state of every other type.
                if self.preferred_types.has(data_type) {
                    self.force_reconfiguration_internal();
                }
            }
            PreconditionState::MustStopAndClearData => {
                self.model_load_manager.stop_data_type(
                    &mut self.controllers,
                    &self.handle,
                    data_type,
                    SyncStopMetadataFate::ClearMetadata,
                );
                self.on_single_data_type_will_stop(
                    data_type,
                    Some(SyncError::policy(data_type, "Datatype preconditions not met.")),
                );
            }
            PreconditionState::MustStopAndKeepData => {
                self.model_load_manager.stop_data_type(
                    &mut self.controllers,
                    &self.handle,
                    data_type,
                    SyncStopMetadataFate::KeepMetadata,
                );
                self.on_single_data_type_will_stop(
                    data_type,
                    Some(SyncError::unready(data_type, "Data type is unready.")),
                );
            }
        }
    }

    fn update_precondition_errors(&mut self) {
        for data_type in self.preferred_types {
            self.update_precondition_error(data_type);
        }
    }

    /// Returns true if the status of `data_type` changed.
    fn update_precondition_error(&mut self, data_type: DataType) -> bool {
        let Some(controller) = self.controllers.get(data_type) else {
            return false;
        };

        match controller.precondition_state() {
            PreconditionState::Met => {
                let policy_changed = self.status_table.reset_policy_error_for(data_type);
                let unready_changed = self.status_table.reset_unready_error_for(data_type);
                if !policy_changed && !unready_changed {
                    return false;
                }
                // Local state may be stale after the outage.
                self.force_redownload_types.put(data_type);
                true
            }
            PreconditionState::MustStopAndClearData => self.record_error(SyncError::policy(
                data_type,
                "Datatype preconditions not met.",
            )),
            PreconditionState::MustStopAndKeepData => self.record_error(SyncError::unready(
                data_type,
                "Datatype not ready at config time.",
            )),
        }
    }

    fn on_single_data_type_will_stop(&mut self, data_type: DataType, error: Option<SyncError>) {
        if let Some(configurer) = self.configurer.as_mut() {
            configurer.disconnect_data_type(data_type);
        }
        self.configured_proxy_types.remove(data_type);

        let Some(error) = error else {
            return;
        };

        self.record_error(error);
        self.needs_reconfigure = true;
        self.last_requested_context.reason = self
            .last_requested_context
            .reason
            .for_programmatic_reconfigure();
        // Let the current phase unwind before reconfiguring.
        self.handle
            .post(ManagerEvent::ProcessReconfigure { epoch: self.epoch });
    }

    fn stop_internal(&mut self, fate: SyncStopMetadataFate) {
        let need_to_notify = self.state == ManagerState::Configuring;
        info!("Stopping data type manager ({:?})", fate);

        self.state = ManagerState::Stopping;

        // Anything issued before this point is stale from now on.
        self.epoch += 1;
        self.batch_in_flight = None;

        self.model_load_manager
            .stop(&mut self.controllers, &self.handle, fate);
        if let Some(configurer) = self.configurer.as_mut() {
            for data_type in self.controllers.types() {
                configurer.disconnect_data_type(data_type);
            }
        }
        self.configured_proxy_types.clear();

        // Controllers may still be winding down, but a new configuration can
        // be requested right away.
        self.state = ManagerState::Stopped;

        self.configuration_types_queue.clear();
        self.needs_reconfigure = false;

        if need_to_notify {
            self.notify_done(ConfigureStatus::Aborted);
        }
    }

    fn notify_done(&mut self, status: ConfigureStatus) {
        let elapsed = self
            .last_restart_time
            .and_then(|t| (Utc::now() - t).to_std().ok())
            .unwrap_or_default();

        info!(
            "Configuration done: {} for {} in {:.3}s",
            status,
            self.preferred_types,
            elapsed.as_secs_f64()
        );

        if self.config.record_metrics {
            let cycle = if self.last_requested_context.reason == ConfigureReason::NewClient {
                "initial"
            } else {
                "subsequent"
            };
            metrics::CONFIGURE_DURATION
                .with_label_values(&[cycle, &status.to_string()])
                .observe(elapsed.as_secs_f64());
        }

        let result = ConfigureResult {
            status,
            requested_types: self.preferred_types,
            status_table: self.status_table.clone(),
        };
        self.observer.on_configure_done(&result);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn expect_state(&self, expected: ManagerState) -> Result<(), ManagerError> {
        if self.state != expected {
            return Err(ManagerError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Records `error` unless the type already carries a fatal error, which
    /// only an explicit reset may clear. The first fatal error is kept.
    /// Returns true if the status changed.
    fn record_error(&mut self, error: SyncError) -> bool {
        let data_type = error.data_type;
        let kind = error.kind;
        if self
            .status_table
            .error_for(data_type)
            .is_some_and(|e| e.kind == ErrorKind::Fatal)
        {
            return false;
        }
        let changed = self.status_table.update_failed_data_type(data_type, error);
        if changed && self.config.record_metrics {
            metrics::DATA_TYPE_ERRORS
                .with_label_values(&[data_type.as_str(), &kind.to_string()])
                .inc();
        }
        changed
    }

    /// Preferred types minus every type with an error. Always recomputed.
    fn enabled_types(&self) -> DataTypeSet {
        self.preferred_types
            .difference(self.status_table.failed_types())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current state of the configuration cycle.
    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Types of the last request, control types included.
    pub fn preferred_types(&self) -> DataTypeSet {
        self.preferred_types
    }

    /// Errors currently recorded per data type.
    pub fn status_table(&self) -> &DataTypeStatusTable {
        &self.status_table
    }

    /// Types with a controller.
    pub fn registered_data_types(&self) -> DataTypeSet {
        self.controllers.types()
    }

    /// Control types plus every type whose controller supports transport-only
    /// mode.
    pub fn data_types_for_transport_only_mode(&self) -> DataTypeSet {
        let mut types = control_types();
        types.extend(
            self.controllers
                .iter()
                .filter(|(_, c)| c.should_run_in_transport_only_mode())
                .map(|(data_type, _)| data_type),
        );
        types
    }

    /// Enabled types. Empty unless configured.
    pub fn active_data_types(&self) -> DataTypeSet {
        if self.state != ManagerState::Configured {
            return DataTypeSet::new();
        }
        self.enabled_types()
    }

    /// Types that bypass the engine. Empty unless configured.
    pub fn active_proxy_data_types(&self) -> DataTypeSet {
        if self.state != ManagerState::Configured {
            return DataTypeSet::new();
        }
        self.configured_proxy_types
    }

    /// Enabled types whose initial download has not completed yet. Empty
    /// unless configuring.
    pub fn types_with_pending_download_for_initial_sync(&self) -> DataTypeSet {
        if self.state != ManagerState::Configuring {
            return DataTypeSet::new();
        }
        self.enabled_types().difference(self.downloaded_types)
    }

    /// Types with a fatal or policy error.
    pub fn data_types_with_permanent_errors(&self) -> DataTypeSet {
        self.status_table.fatal_error_types()
    }

    /// Types whose controller is not running.
    pub fn purged_data_types(&self) -> DataTypeSet {
        self.controllers
            .iter()
            .filter(|(_, c)| c.state() == ControllerState::NotRunning)
            .map(|(data_type, _)| data_type)
            .collect()
    }

    /// Registered controllers, keyed by data type.
    pub fn controllers(&self) -> &ControllerMap {
        &self.controllers
    }
}

impl std::fmt::Debug for DataTypeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTypeManager")
            .field("state", &self.state)
            .field("preferred_types", &self.preferred_types)
            .field("downloaded_types", &self.downloaded_types)
            .field("status_table", &self.status_table)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{self, Harness};
    use crate::testing::MockController;

    #[test]
    fn test_record_error_keeps_first_fatal() {
        let mut h = Harness::new(vec![MockController::new(DataType::Bookmarks)]).unwrap();
        let manager = &mut h.manager;

        assert!(manager.record_error(SyncError::fatal(DataType::Bookmarks, "first")));
        assert!(!manager.record_error(SyncError::fatal(DataType::Bookmarks, "second")));
        assert!(!manager.record_error(SyncError::unready(DataType::Bookmarks, "later")));

        let error = manager.status_table().error_for(DataType::Bookmarks).unwrap();
        assert_eq!(error.kind, ErrorKind::Fatal);
        assert_eq!(error.message, "first");
    }

    #[test]
    fn test_enabled_types_exclude_failures() {
        let mut h = Harness::new(vec![
            MockController::new(DataType::Bookmarks),
            MockController::new(DataType::Passwords),
        ])
        .unwrap();
        h.configure(DataTypeSet::from([DataType::Bookmarks, DataType::Passwords]))
            .unwrap();
        h.manager
            .record_error(SyncError::policy(DataType::Passwords, "disallowed"));

        assert_eq!(
            h.manager.enabled_types(),
            DataTypeSet::from([DataType::Nigori, DataType::Bookmarks])
        );
    }

    #[test]
    fn test_force_reconfiguration_ignored_when_stopped() {
        let mut h = Harness::new(vec![MockController::new(DataType::Bookmarks)]).unwrap();
        h.manager.force_reconfiguration();

        assert_eq!(h.manager.state(), ManagerState::Stopped);
        assert!(!h.manager.needs_reconfigure);
        assert_eq!(h.observer.start_count(), 0);
    }

    #[test]
    fn test_force_reconfiguration_when_configured() {
        let mut h = Harness::new(vec![MockController::new(DataType::Bookmarks)]).unwrap();
        h.manager
            .configure(
                DataTypeSet::from([DataType::Bookmarks]),
                fixtures::context(ConfigureReason::Reconfiguration),
            )
            .unwrap();
        h.complete_all_batches();

        h.manager.force_reconfiguration();

        assert_eq!(h.manager.state(), ManagerState::Configuring);
        assert_eq!(
            h.manager.last_requested_context.reason,
            ConfigureReason::Programmatic
        );
        assert_eq!(h.observer.start_count(), 2);
    }

    #[test]
    fn test_stop_bumps_epoch_and_clears_batch() {
        let mut h = Harness::new(vec![MockController::new(DataType::Bookmarks)]).unwrap();
        h.configure(DataTypeSet::from([DataType::Bookmarks])).unwrap();
        assert!(h.manager.batch_in_flight.is_some());

        h.manager.stop(SyncStopMetadataFate::KeepMetadata);

        assert_eq!(h.manager.epoch, 1);
        assert!(h.manager.batch_in_flight.is_none());
        assert!(h.manager.configuration_types_queue.is_empty());
    }

    #[test]
    fn test_restart_keeps_unready_error_of_encrypted_type() {
        let mut h = Harness::new(vec![MockController::new(DataType::ReadingList)
            .with_precondition(PreconditionState::MustStopAndKeepData)])
        .unwrap();
        h.manager.config.record_metrics = true;
        h.encryption.set_crypto_error(true);
        h.encryption
            .set_encrypted_types(DataTypeSet::from([DataType::ReadingList]));
        let recorded = |kind: &str| {
            metrics::DATA_TYPE_ERRORS
                .with_label_values(&["reading_list", kind])
                .get()
        };

        h.configure(DataTypeSet::from([DataType::ReadingList]))
            .unwrap();
        h.complete_all_batches();
        assert_eq!(recorded("unready"), 1);

        h.manager.force_reconfiguration();
        h.manager.run_until_idle();
        h.complete_all_batches();

        assert_eq!(h.manager.state(), ManagerState::Configured);
        assert_eq!(recorded("unready"), 1);
        assert_eq!(recorded("crypto"), 0);
        assert_eq!(
            h.manager
                .status_table()
                .error_for(DataType::ReadingList)
                .map(|e| e.kind),
            Some(ErrorKind::Unready)
        );
    }

    #[test]
    fn test_classify_batch_is_disjoint() {
        let mut h = Harness::new(vec![
            MockController::new(DataType::Bookmarks),
            MockController::new(DataType::History),
        ])
        .unwrap();
        h.configure(DataTypeSet::from([DataType::Bookmarks, DataType::History]))
            .unwrap();
        h.manager
            .record_error(SyncError::unready(DataType::History, "not yet"));

        let classes = h
            .manager
            .classify_batch(DataTypeSet::from([DataType::Bookmarks]));
        assert_eq!(classes.active, DataTypeSet::from([DataType::Bookmarks]));
        assert_eq!(classes.inactive, DataTypeSet::from([DataType::Nigori]));
        assert_eq!(classes.unready, DataTypeSet::from([DataType::History]));
        assert!(classes.disabled.has(DataType::History));
        assert!(classes.active.intersection(classes.disabled).is_empty());
    }
}
