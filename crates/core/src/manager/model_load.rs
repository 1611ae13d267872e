//! Brings controllers to `ModelLoaded` before the manager connects them.

use tracing::{debug, warn};

use crate::context::ConfigureContext;
use crate::controller::{ControllerMap, ControllerState, SyncStopMetadataFate};
use crate::data_type::{DataType, DataTypeSet};
use crate::status_table::SyncError;

use super::handle::{ManagerEvent, ManagerHandle, ModelLoadCallback, StopCallback};

/// Tracks outstanding model loads for one configuration round.
///
/// When nothing is outstanding it posts `AllModelsReady` for the current
/// round. The notification is always posted, never delivered re-entrantly.
///
/// A desired controller that is still `Stopping` counts as outstanding; its
/// load starts once the stop completes.
#[derive(Debug, Default)]
pub(crate) struct ModelLoadManager {
    epoch: u64,
    round: u64,
    context: ConfigureContext,
    loading: DataTypeSet,
    /// Subset of `loading` waiting for a stop to finish.
    awaiting_stop: DataTypeSet,
    notified: bool,
}

impl ModelLoadManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn round(&self) -> u64 {
        self.round
    }

    #[cfg(test)]
    pub(crate) fn loading_types(&self) -> DataTypeSet {
        self.loading
    }

    #[cfg(test)]
    pub(crate) fn awaiting_stop_types(&self) -> DataTypeSet {
        self.awaiting_stop
    }

    /// Starts a new round: stops controllers that must not run and starts
    /// loading the ones that should. Returns the types that were stopped.
    pub(crate) fn configure(
        &mut self,
        controllers: &mut ControllerMap,
        handle: &ManagerHandle,
        epoch: u64,
        preferred_types_without_errors: DataTypeSet,
        preferred_types: DataTypeSet,
        context: &ConfigureContext,
    ) -> DataTypeSet {
        self.epoch = epoch;
        self.round += 1;
        self.context = context.clone();
        self.notified = false;
        self.loading.remove_all(self.awaiting_stop);
        self.awaiting_stop.clear();

        let mut stopped = DataTypeSet::new();
        for (data_type, controller) in controllers.iter_mut() {
            if preferred_types_without_errors.has(data_type) {
                continue;
            }
            if !matches!(
                controller.state(),
                ControllerState::ModelLoading
                    | ControllerState::ModelLoaded
                    | ControllerState::Running
            ) {
                continue;
            }
            // Types that are still wanted but currently failing keep their
            // data; types nobody wants any more lose it.
            let fate = if preferred_types.has(data_type) {
                SyncStopMetadataFate::KeepMetadata
            } else {
                SyncStopMetadataFate::ClearMetadata
            };
            debug!("Stopping {} ({:?}) before configuration", data_type, fate);
            controller.stop(fate, StopCallback::new(handle.clone(), data_type));
            stopped.put(data_type);
        }
        self.loading.remove_all(stopped);

        for data_type in preferred_types_without_errors {
            let Some(controller) = controllers.get_mut(data_type) else {
                continue;
            };
            match controller.state() {
                ControllerState::NotRunning => {
                    debug!("Loading models for {}", data_type);
                    self.loading.put(data_type);
                    controller.load_models(
                        context,
                        ModelLoadCallback::new(handle.clone(), epoch, data_type),
                    );
                }
                // Still in flight from an earlier round.
                ControllerState::ModelLoading => self.loading.put(data_type),
                ControllerState::Stopping => {
                    debug!("Waiting for {} to stop before loading", data_type);
                    self.loading.put(data_type);
                    self.awaiting_stop.put(data_type);
                }
                _ => {}
            }
        }

        self.notify_if_all_ready(handle);
        stopped
    }

    /// Handles a finished load. Returns the error if the load failed, after
    /// stopping the controller.
    pub(crate) fn on_model_loaded(
        &mut self,
        controllers: &mut ControllerMap,
        handle: &ManagerHandle,
        epoch: u64,
        data_type: DataType,
        result: Result<(), SyncError>,
    ) -> Option<SyncError> {
        if epoch != self.epoch || !self.loading.has(data_type) {
            debug!("Ignoring stale model load completion for {}", data_type);
            return None;
        }
        self.loading.remove(data_type);

        let error = match result {
            Ok(()) => None,
            Err(error) => {
                warn!("Model load failed for {}: {}", data_type, error);
                if let Some(controller) = controllers.get_mut(data_type) {
                    controller.stop(
                        SyncStopMetadataFate::KeepMetadata,
                        StopCallback::new(handle.clone(), data_type),
                    );
                }
                Some(error)
            }
        };

        self.notify_if_all_ready(handle);
        error
    }

    /// Handles a finished stop. Starts the pending load if the type was
    /// waiting for it. Returns an error if the controller failed instead.
    pub(crate) fn on_controller_stopped(
        &mut self,
        controllers: &mut ControllerMap,
        handle: &ManagerHandle,
        data_type: DataType,
    ) -> Option<SyncError> {
        if !self.awaiting_stop.has(data_type) {
            return None;
        }
        let controller = controllers.get_mut(data_type)?;

        match controller.state() {
            // An earlier stop finished; the latest one is still running.
            ControllerState::Stopping => None,
            ControllerState::NotRunning => {
                debug!("{} stopped, loading models", data_type);
                self.awaiting_stop.remove(data_type);
                controller.load_models(
                    &self.context,
                    ModelLoadCallback::new(handle.clone(), self.epoch, data_type),
                );
                None
            }
            state => {
                warn!("{} reported {} after stopping", data_type, state);
                self.awaiting_stop.remove(data_type);
                self.loading.remove(data_type);
                self.notify_if_all_ready(handle);
                Some(SyncError::fatal(
                    data_type,
                    format!("Controller reported {} after stopping", state),
                ))
            }
        }
    }

    /// Stops a single type outside of the regular configuration flow.
    pub(crate) fn stop_data_type(
        &mut self,
        controllers: &mut ControllerMap,
        handle: &ManagerHandle,
        data_type: DataType,
        fate: SyncStopMetadataFate,
    ) {
        if let Some(controller) = controllers.get_mut(data_type) {
            controller.stop(fate, StopCallback::new(handle.clone(), data_type));
        }
        self.awaiting_stop.remove(data_type);
        if self.loading.has(data_type) {
            self.loading.remove(data_type);
            self.notify_if_all_ready(handle);
        }
    }

    /// Stops every controller and forgets outstanding loads.
    pub(crate) fn stop(
        &mut self,
        controllers: &mut ControllerMap,
        handle: &ManagerHandle,
        fate: SyncStopMetadataFate,
    ) {
        for (data_type, controller) in controllers.iter_mut() {
            controller.stop(fate, StopCallback::new(handle.clone(), data_type));
        }
        self.loading.clear();
        self.awaiting_stop.clear();
        self.notified = true;
    }

    fn notify_if_all_ready(&mut self, handle: &ManagerHandle) {
        if self.notified || !self.loading.is_empty() {
            return;
        }
        self.notified = true;
        handle.post(ManagerEvent::AllModelsReady {
            epoch: self.epoch,
            round: self.round,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConfigureReason;
    use crate::testing::MockController;
    use tokio::sync::mpsc;

    fn context() -> ConfigureContext {
        ConfigureContext::default().with_reason(ConfigureReason::NewClient)
    }

    fn setup(
        controllers: Vec<MockController>,
    ) -> (
        ControllerMap,
        ManagerHandle,
        mpsc::UnboundedReceiver<ManagerEvent>,
    ) {
        let map = ControllerMap::new(
            controllers
                .into_iter()
                .map(|c| Box::new(c) as crate::controller::BoxedController)
                .collect(),
        )
        .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (map, ManagerHandle::new(tx), rx)
    }

    #[test]
    fn test_notifies_when_loads_complete() {
        let bookmarks = MockController::new(DataType::Bookmarks).with_deferred_load();
        let (mut map, handle, mut rx) = setup(vec![bookmarks.clone()]);
        let mut mlm = ModelLoadManager::new();

        let types = DataTypeSet::from([DataType::Bookmarks]);
        mlm.configure(&mut map, &handle, 0, types, types, &context());

        assert_eq!(bookmarks.state(), ControllerState::ModelLoading);
        assert!(rx.try_recv().is_err());

        let error = mlm.on_model_loaded(&mut map, &handle, 0, DataType::Bookmarks, Ok(()));
        assert!(error.is_none());
        assert!(matches!(
            rx.try_recv(),
            Ok(ManagerEvent::AllModelsReady { epoch: 0, round: 1 })
        ));
    }

    #[test]
    fn test_nothing_to_load_notifies_immediately() {
        let (mut map, handle, mut rx) = setup(vec![]);
        let mut mlm = ModelLoadManager::new();

        let types = DataTypeSet::from([DataType::Nigori]);
        let stopped = mlm.configure(&mut map, &handle, 0, types, types, &context());

        assert!(stopped.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Ok(ManagerEvent::AllModelsReady { round: 1, .. })
        ));
    }

    #[test]
    fn test_stops_undesired_types() {
        let bookmarks = MockController::new(DataType::Bookmarks);
        let history = MockController::new(DataType::History);
        bookmarks.set_state(ControllerState::Running);
        history.set_state(ControllerState::Running);
        let (mut map, handle, _rx) = setup(vec![bookmarks.clone(), history.clone()]);
        let mut mlm = ModelLoadManager::new();

        // History is still preferred but failing, bookmarks is not wanted.
        let stopped = mlm.configure(
            &mut map,
            &handle,
            0,
            DataTypeSet::new(),
            DataTypeSet::from([DataType::History]),
            &context(),
        );

        assert_eq!(
            stopped,
            DataTypeSet::from([DataType::Bookmarks, DataType::History])
        );
        assert_eq!(
            bookmarks.stop_calls(),
            vec![SyncStopMetadataFate::ClearMetadata]
        );
        assert_eq!(history.stop_calls(), vec![SyncStopMetadataFate::KeepMetadata]);
    }

    #[test]
    fn test_failed_load_is_reported() {
        let bookmarks = MockController::new(DataType::Bookmarks).with_deferred_load();
        let (mut map, handle, _rx) = setup(vec![bookmarks.clone()]);
        let mut mlm = ModelLoadManager::new();

        let types = DataTypeSet::from([DataType::Bookmarks]);
        mlm.configure(&mut map, &handle, 0, types, types, &context());

        let error = mlm.on_model_loaded(
            &mut map,
            &handle,
            0,
            DataType::Bookmarks,
            Err(SyncError::fatal(DataType::Bookmarks, "corrupt db")),
        );
        assert_eq!(error.map(|e| e.message), Some("corrupt db".to_string()));
        assert_eq!(bookmarks.stop_calls(), vec![SyncStopMetadataFate::KeepMetadata]);
    }

    #[test]
    fn test_stopping_controller_loads_after_stop() {
        let bookmarks = MockController::new(DataType::Bookmarks).with_deferred_stop();
        bookmarks.set_state(ControllerState::Running);
        let (mut map, handle, mut rx) = setup(vec![bookmarks.clone()]);
        let mut mlm = ModelLoadManager::new();

        // Unwanted: the stop is left pending.
        mlm.configure(
            &mut map,
            &handle,
            0,
            DataTypeSet::new(),
            DataTypeSet::new(),
            &context(),
        );
        assert_eq!(bookmarks.state(), ControllerState::Stopping);
        assert!(matches!(
            rx.try_recv(),
            Ok(ManagerEvent::AllModelsReady { round: 1, .. })
        ));

        // Wanted again before the stop finished.
        let types = DataTypeSet::from([DataType::Bookmarks]);
        mlm.configure(&mut map, &handle, 0, types, types, &context());
        assert_eq!(mlm.loading_types(), types);
        assert_eq!(mlm.awaiting_stop_types(), types);
        assert_eq!(bookmarks.load_count(), 0);
        assert!(rx.try_recv().is_err());

        assert!(bookmarks.complete_stop());
        assert!(matches!(
            rx.try_recv(),
            Ok(ManagerEvent::ControllerStopped(DataType::Bookmarks))
        ));
        let error = mlm.on_controller_stopped(&mut map, &handle, DataType::Bookmarks);
        assert!(error.is_none());
        assert!(mlm.awaiting_stop_types().is_empty());
        assert_eq!(bookmarks.load_count(), 1);
        assert_eq!(bookmarks.state(), ControllerState::ModelLoaded);

        assert!(matches!(
            rx.try_recv(),
            Ok(ManagerEvent::ModelLoaded {
                data_type: DataType::Bookmarks,
                ..
            })
        ));
        mlm.on_model_loaded(&mut map, &handle, 0, DataType::Bookmarks, Ok(()));
        assert!(matches!(
            rx.try_recv(),
            Ok(ManagerEvent::AllModelsReady { round: 2, .. })
        ));
    }

    #[test]
    fn test_stop_completion_for_unawaited_type_ignored() {
        let bookmarks = MockController::new(DataType::Bookmarks);
        let (mut map, handle, _rx) = setup(vec![bookmarks.clone()]);
        let mut mlm = ModelLoadManager::new();

        let error = mlm.on_controller_stopped(&mut map, &handle, DataType::Bookmarks);
        assert!(error.is_none());
        assert_eq!(bookmarks.load_count(), 0);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let bookmarks = MockController::new(DataType::Bookmarks).with_deferred_load();
        let (mut map, handle, mut rx) = setup(vec![bookmarks]);
        let mut mlm = ModelLoadManager::new();

        let types = DataTypeSet::from([DataType::Bookmarks]);
        mlm.configure(&mut map, &handle, 1, types, types, &context());

        let error = mlm.on_model_loaded(&mut map, &handle, 0, DataType::Bookmarks, Ok(()));
        assert!(error.is_none());
        assert_eq!(mlm.loading_types(), types);
        assert!(rx.try_recv().is_err());
    }
}
