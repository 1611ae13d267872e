//! Mock data type controller for testing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::ConfigureContext;
use crate::controller::{
    ActivationResponse, ControllerState, DataTypeController, EngineActivation, PreconditionState,
    SyncStopMetadataFate,
};
use crate::data_type::DataType;
use crate::manager::{ModelLoadCallback, StopCallback};
use crate::status_table::SyncError;

/// How the mock answers `load_models`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadBehavior {
    /// Complete successfully right away.
    Immediate,
    /// Hold the callback until `complete_load` is called.
    Deferred,
    /// Fail right away with this message.
    Fail(String),
}

#[derive(Debug)]
struct Inner {
    state: ControllerState,
    precondition: PreconditionState,
    load_behavior: LoadBehavior,
    proxy: bool,
    initial_sync_done: bool,
    transport_only: bool,
    /// Report `Failed` instead of `Running` after connect.
    fail_connect: bool,
    pending_load: Option<ModelLoadCallback>,
    /// Stay `Stopping` until `complete_stop` is called.
    defer_stop: bool,
    pending_stop: Option<StopCallback>,
    load_contexts: Vec<ConfigureContext>,
    connect_count: usize,
    stop_calls: Vec<SyncStopMetadataFate>,
}

/// Mock implementation of [`DataTypeController`].
///
/// Clones share state, so a test can keep one clone for assertions after
/// handing another to the manager.
///
/// # Example
///
/// ```rust,ignore
/// use typesync_core::testing::MockController;
///
/// let bookmarks = MockController::new(DataType::Bookmarks).with_deferred_load();
/// // hand `bookmarks.clone()` to the manager, configure...
/// bookmarks.complete_load(Ok(()));
/// assert_eq!(bookmarks.connect_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockController {
    data_type: DataType,
    inner: Arc<Mutex<Inner>>,
}

impl MockController {
    /// A controller that loads immediately and reports initial sync done.
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            inner: Arc::new(Mutex::new(Inner {
                state: ControllerState::NotRunning,
                precondition: PreconditionState::Met,
                load_behavior: LoadBehavior::Immediate,
                proxy: false,
                initial_sync_done: true,
                transport_only: false,
                fail_connect: false,
                pending_load: None,
                defer_stop: false,
                pending_stop: None,
                load_contexts: Vec::new(),
                connect_count: 0,
                stop_calls: Vec::new(),
            })),
        }
    }

    /// Hold model loads until [`complete_load`](Self::complete_load).
    pub fn with_deferred_load(self) -> Self {
        self.inner().load_behavior = LoadBehavior::Deferred;
        self
    }

    /// Fail every model load with `message`.
    pub fn with_load_error(self, message: &str) -> Self {
        self.inner().load_behavior = LoadBehavior::Fail(message.to_string());
        self
    }

    /// Hold stops in `Stopping` until [`complete_stop`](Self::complete_stop).
    pub fn with_deferred_stop(self) -> Self {
        self.inner().defer_stop = true;
        self
    }

    /// Connect as a proxy type that bypasses the engine.
    pub fn with_proxy(self) -> Self {
        self.inner().proxy = true;
        self
    }

    pub fn with_initial_sync_done(self, done: bool) -> Self {
        self.inner().initial_sync_done = done;
        self
    }

    pub fn with_transport_only(self) -> Self {
        self.inner().transport_only = true;
        self
    }

    pub fn with_precondition(self, precondition: PreconditionState) -> Self {
        self.inner().precondition = precondition;
        self
    }

    /// End up `Failed` instead of `Running` when connected.
    pub fn with_failing_connect(self) -> Self {
        self.inner().fail_connect = true;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.inner().state
    }

    pub fn set_state(&self, state: ControllerState) {
        self.inner().state = state;
    }

    pub fn set_precondition(&self, precondition: PreconditionState) {
        self.inner().precondition = precondition;
    }

    pub fn set_initial_sync_done(&self, done: bool) {
        self.inner().initial_sync_done = done;
    }

    /// Finish a deferred load. Returns false if no load is pending.
    pub fn complete_load(&self, result: Result<(), SyncError>) -> bool {
        let callback = {
            let mut inner = self.inner();
            let Some(callback) = inner.pending_load.take() else {
                return false;
            };
            inner.state = if result.is_ok() {
                ControllerState::ModelLoaded
            } else {
                ControllerState::Failed
            };
            callback
        };
        callback.run(result);
        true
    }

    /// Finish a deferred stop. Returns false if no stop is pending.
    pub fn complete_stop(&self) -> bool {
        let callback = {
            let mut inner = self.inner();
            let Some(callback) = inner.pending_stop.take() else {
                return false;
            };
            if inner.state == ControllerState::Stopping {
                inner.state = ControllerState::NotRunning;
            }
            callback
        };
        callback.run();
        true
    }

    pub fn has_pending_stop(&self) -> bool {
        self.inner().pending_stop.is_some()
    }

    pub fn has_pending_load(&self) -> bool {
        self.inner().pending_load.is_some()
    }

    pub fn load_count(&self) -> usize {
        self.inner().load_contexts.len()
    }

    /// Contexts passed to every `load_models` call.
    pub fn load_contexts(&self) -> Vec<ConfigureContext> {
        self.inner().load_contexts.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner().connect_count
    }

    pub fn stop_calls(&self) -> Vec<SyncStopMetadataFate> {
        self.inner().stop_calls.clone()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataTypeController for MockController {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn state(&self) -> ControllerState {
        self.inner().state
    }

    fn precondition_state(&self) -> PreconditionState {
        self.inner().precondition
    }

    fn should_run_in_transport_only_mode(&self) -> bool {
        self.inner().transport_only
    }

    fn load_models(&mut self, context: &ConfigureContext, done: ModelLoadCallback) {
        let mut inner = self.inner();
        inner.load_contexts.push(context.clone());
        match inner.load_behavior.clone() {
            LoadBehavior::Immediate => {
                inner.state = ControllerState::ModelLoaded;
                drop(inner);
                done.run(Ok(()));
            }
            LoadBehavior::Deferred => {
                inner.state = ControllerState::ModelLoading;
                inner.pending_load = Some(done);
            }
            LoadBehavior::Fail(message) => {
                inner.state = ControllerState::Failed;
                drop(inner);
                done.run(Err(SyncError::fatal(self.data_type, message)));
            }
        }
    }

    fn connect(&mut self) -> ActivationResponse {
        let mut inner = self.inner();
        inner.connect_count += 1;
        if inner.fail_connect {
            inner.state = ControllerState::Failed;
        } else {
            inner.state = ControllerState::Running;
        }
        if inner.proxy {
            ActivationResponse::Proxy
        } else {
            ActivationResponse::Engine(EngineActivation {
                initial_sync_done: inner.initial_sync_done,
            })
        }
    }

    fn stop(&mut self, fate: SyncStopMetadataFate, done: StopCallback) {
        let mut inner = self.inner();
        inner.stop_calls.push(fate);
        inner.pending_load = None;
        // Failures stick until the controller is rebuilt.
        if inner.state == ControllerState::Failed {
            drop(inner);
            done.run();
            return;
        }
        if inner.defer_stop {
            inner.state = ControllerState::Stopping;
            inner.pending_stop = Some(done);
            return;
        }
        inner.state = ControllerState::NotRunning;
        drop(inner);
        done.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConfigureReason;
    use crate::manager::ManagerHandle;
    use tokio::sync::mpsc;

    fn callback(data_type: DataType) -> ModelLoadCallback {
        let (tx, _rx) = mpsc::unbounded_channel();
        ModelLoadCallback::new(ManagerHandle::new(tx), 0, data_type)
    }

    fn stop_callback(data_type: DataType) -> StopCallback {
        crate::testing::fixtures::detached_stop_callback(data_type)
    }

    #[test]
    fn test_immediate_load() {
        let mut controller = MockController::new(DataType::Bookmarks);
        let context = ConfigureContext::default().with_reason(ConfigureReason::NewClient);
        controller.load_models(&context, callback(DataType::Bookmarks));

        assert_eq!(controller.state(), ControllerState::ModelLoaded);
        assert_eq!(controller.load_contexts(), vec![context]);
    }

    #[test]
    fn test_deferred_load() {
        let mut controller = MockController::new(DataType::Bookmarks).with_deferred_load();
        controller.load_models(&ConfigureContext::default(), callback(DataType::Bookmarks));

        assert_eq!(controller.state(), ControllerState::ModelLoading);
        assert!(controller.has_pending_load());
        assert!(controller.complete_load(Ok(())));
        assert_eq!(controller.state(), ControllerState::ModelLoaded);
        assert!(!controller.complete_load(Ok(())));
    }

    #[test]
    fn test_connect_as_proxy() {
        let mut controller = MockController::new(DataType::Sessions).with_proxy();
        assert_eq!(controller.connect(), ActivationResponse::Proxy);
        assert_eq!(controller.state(), ControllerState::Running);
    }

    #[test]
    fn test_stop_keeps_failure() {
        let mut controller = MockController::new(DataType::Bookmarks);
        controller.set_state(ControllerState::Failed);
        controller.stop(
            SyncStopMetadataFate::KeepMetadata,
            stop_callback(DataType::Bookmarks),
        );
        assert_eq!(controller.state(), ControllerState::Failed);
        assert_eq!(
            controller.stop_calls(),
            vec![SyncStopMetadataFate::KeepMetadata]
        );
    }

    #[test]
    fn test_deferred_stop() {
        let mut controller = MockController::new(DataType::Bookmarks).with_deferred_stop();
        controller.set_state(ControllerState::Running);
        controller.stop(
            SyncStopMetadataFate::ClearMetadata,
            stop_callback(DataType::Bookmarks),
        );

        assert_eq!(controller.state(), ControllerState::Stopping);
        assert!(controller.has_pending_stop());
        assert!(controller.complete_stop());
        assert_eq!(controller.state(), ControllerState::NotRunning);
        assert!(!controller.complete_stop());
    }
}
