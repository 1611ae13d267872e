//! Mock download/purge engine for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::configurer::{ConfigureParams, DataTypeConfigurer};
use crate::context::ConfigureReason;
use crate::controller::EngineActivation;
use crate::data_type::{DataType, DataTypeSet};
use crate::manager::ReadyCallback;

/// A recorded configuration batch for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBatch {
    pub reason: ConfigureReason,
    pub to_download: DataTypeSet,
    pub to_purge: DataTypeSet,
    pub is_sync_feature_enabled: bool,
}

#[derive(Debug, Default)]
struct Inner {
    batches: Vec<RecordedBatch>,
    pending: VecDeque<(RecordedBatch, ReadyCallback)>,
    auto_complete: bool,
    /// Types reported as failed when a batch is completed.
    failing_types: DataTypeSet,
    connected: DataTypeSet,
    connect_calls: Vec<(DataType, EngineActivation)>,
    disconnect_calls: Vec<DataType>,
}

/// Mock implementation of [`DataTypeConfigurer`].
///
/// By default batches stay pending until the test completes them, which lets
/// it interleave requests with in-flight batches. In auto-complete mode every
/// batch is reported ready as soon as it arrives.
///
/// # Example
///
/// ```rust,ignore
/// use typesync_core::testing::MockConfigurer;
///
/// let configurer = MockConfigurer::new();
/// manager.set_configurer(Box::new(configurer.clone()))?;
/// manager.configure(types, context)?;
///
/// assert_eq!(configurer.batches().len(), 1);
/// configurer.complete_next();
/// manager.run_until_idle();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockConfigurer {
    inner: Arc<Mutex<Inner>>,
}

impl MockConfigurer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every batch ready as soon as it is issued.
    pub fn with_auto_complete(self) -> Self {
        self.inner().auto_complete = true;
        self
    }

    /// Report `types` as failed whenever they are part of a completed
    /// batch's download set.
    pub fn set_failing_types(&self, types: DataTypeSet) {
        self.inner().failing_types = types;
    }

    /// Every batch issued so far, in order.
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.inner().batches.clone()
    }

    pub fn last_batch(&self) -> Option<RecordedBatch> {
        self.inner().batches.last().cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.inner().pending.len()
    }

    /// Complete the oldest pending batch: everything downloaded succeeds
    /// except the failing types. Returns false if nothing is pending.
    pub fn complete_next(&self) -> bool {
        let next = {
            let mut inner = self.inner();
            let failing_types = inner.failing_types;
            inner
                .pending
                .pop_front()
                .map(|(batch, ready)| (batch, ready, failing_types))
        };
        match next {
            Some((batch, ready, failing_types)) => {
                Self::finish(batch, ready, failing_types);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest pending batch with explicit results.
    pub fn complete_next_with(&self, succeeded: DataTypeSet, failed: DataTypeSet) -> bool {
        let next = self.inner().pending.pop_front();
        match next {
            Some((_, ready)) => {
                ready.run(succeeded, failed);
                true
            }
            None => false,
        }
    }

    /// Types currently connected to the engine.
    pub fn connected_types(&self) -> DataTypeSet {
        self.inner().connected
    }

    pub fn connect_calls(&self) -> Vec<(DataType, EngineActivation)> {
        self.inner().connect_calls.clone()
    }

    pub fn disconnect_calls(&self) -> Vec<DataType> {
        self.inner().disconnect_calls.clone()
    }

    fn finish(batch: RecordedBatch, ready: ReadyCallback, failing_types: DataTypeSet) {
        let failed = batch.to_download.intersection(failing_types);
        let succeeded = batch.to_download.difference(failed);
        ready.run(succeeded, failed);
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataTypeConfigurer for MockConfigurer {
    fn configure_data_types(&mut self, params: ConfigureParams) {
        let batch = RecordedBatch {
            reason: params.reason,
            to_download: params.to_download,
            to_purge: params.to_purge,
            is_sync_feature_enabled: params.is_sync_feature_enabled,
        };

        let mut inner = self.inner();
        inner.batches.push(batch.clone());
        if inner.auto_complete {
            let failing_types = inner.failing_types;
            drop(inner);
            Self::finish(batch, params.ready, failing_types);
        } else {
            inner.pending.push_back((batch, params.ready));
        }
    }

    fn connect_data_type(&mut self, data_type: DataType, activation: EngineActivation) {
        let mut inner = self.inner();
        inner.connected.put(data_type);
        inner.connect_calls.push((data_type, activation));
    }

    fn disconnect_data_type(&mut self, data_type: DataType) {
        let mut inner = self.inner();
        if inner.connected.has(data_type) {
            inner.connected.remove(data_type);
            inner.disconnect_calls.push(data_type);
        }
    }
}
