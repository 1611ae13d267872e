//! Async driver integration tests.
//!
//! These tests run the manager's event loop on the tokio runtime and drive it
//! only through its handle, with an engine that completes batches from
//! spawned tasks.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use typesync_core::{
    testing::{fixtures, MockController, MockEncryptionHandler},
    BroadcastObserver, ConfigureNotification, ConfigureParams, ConfigureStatus,
    DataTypeConfigurer, DataTypeManager, DataType, DataTypeSet, EngineActivation, ManagerConfig,
    ManagerState, SyncStopMetadataFate,
};

use DataType::*;

const WAIT: Duration = Duration::from_secs(5);

/// Engine that applies every batch after a delay on a spawned task.
struct DelayedConfigurer {
    delay: Duration,
}

impl DataTypeConfigurer for DelayedConfigurer {
    fn configure_data_types(&mut self, params: ConfigureParams) {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            params.ready.run(params.to_download, DataTypeSet::new());
        });
    }

    fn connect_data_type(&mut self, _data_type: DataType, _activation: EngineActivation) {}

    fn disconnect_data_type(&mut self, _data_type: DataType) {}
}

fn build_manager(
    controllers: Vec<MockController>,
    delay: Duration,
) -> (DataTypeManager, BroadcastObserver) {
    let observer = BroadcastObserver::new(16);
    let mut manager = DataTypeManager::new(
        ManagerConfig::default(),
        controllers
            .into_iter()
            .map(|c| Box::new(c) as typesync_core::BoxedController)
            .collect(),
        Box::new(MockEncryptionHandler::new()),
        Box::new(observer.clone()),
    )
    .expect("Failed to create manager");
    manager
        .set_configurer(Box::new(DelayedConfigurer { delay }))
        .expect("Failed to set configurer");
    (manager, observer)
}

async fn next_notification(
    rx: &mut broadcast::Receiver<ConfigureNotification>,
) -> ConfigureNotification {
    timeout(WAIT, rx.recv())
        .await
        .expect("Timed out waiting for notification")
        .expect("Notification channel closed")
}

#[tokio::test]
async fn test_run_loop_configures_through_handle() {
    let (manager, observer) = build_manager(
        vec![
            MockController::new(Bookmarks).with_initial_sync_done(false),
            MockController::new(History).with_initial_sync_done(false),
        ],
        Duration::from_millis(5),
    );
    let mut notifications = observer.subscribe();
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(manager.run(shutdown_rx));

    handle.configure(
        DataTypeSet::from([Bookmarks, History]),
        fixtures::new_client_context(),
    );

    assert_eq!(
        next_notification(&mut notifications).await,
        ConfigureNotification::Started
    );
    match next_notification(&mut notifications).await {
        ConfigureNotification::Done(result) => {
            assert_eq!(result.status, ConfigureStatus::Ok);
            assert_eq!(
                result.requested_types,
                DataTypeSet::from([Nigori, Bookmarks, History])
            );
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    shutdown_tx.send(()).unwrap();
    let manager = timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(manager.state(), ManagerState::Configured);
    assert_eq!(
        manager.active_data_types(),
        DataTypeSet::from([Nigori, Bookmarks, History])
    );
}

#[tokio::test]
async fn test_stop_through_handle_aborts() {
    // Slow enough that the stop arrives while the first batch is in flight.
    let (manager, observer) = build_manager(
        vec![MockController::new(Bookmarks)],
        Duration::from_millis(200),
    );
    let mut notifications = observer.subscribe();
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(manager.run(shutdown_rx));

    handle.configure(DataTypeSet::from([Bookmarks]), fixtures::new_client_context());
    assert_eq!(
        next_notification(&mut notifications).await,
        ConfigureNotification::Started
    );

    handle.stop(SyncStopMetadataFate::KeepMetadata);
    match next_notification(&mut notifications).await {
        ConfigureNotification::Done(result) => {
            assert_eq!(result.status, ConfigureStatus::Aborted);
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    // Let the stale batch completion arrive and be dropped.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(()).unwrap();
    let manager = timeout(WAIT, task).await.unwrap().unwrap();

    assert_eq!(manager.state(), ManagerState::Stopped);
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_reconfigure_through_handle_converges() {
    let (manager, observer) = build_manager(
        vec![
            MockController::new(Bookmarks),
            MockController::new(Passwords),
        ],
        Duration::from_millis(20),
    );
    let mut notifications = observer.subscribe();
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(manager.run(shutdown_rx));

    handle.configure(DataTypeSet::from([Bookmarks]), fixtures::new_client_context());
    handle.configure(
        DataTypeSet::from([Bookmarks, Passwords]),
        fixtures::new_client_context(),
    );

    assert_eq!(
        next_notification(&mut notifications).await,
        ConfigureNotification::Started
    );
    match next_notification(&mut notifications).await {
        ConfigureNotification::Done(result) => {
            assert_eq!(result.status, ConfigureStatus::Ok);
            assert_eq!(
                result.requested_types,
                DataTypeSet::from([Nigori, Bookmarks, Passwords])
            );
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    shutdown_tx.send(()).unwrap();
    let manager = timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(manager.state(), ManagerState::Configured);
}

#[tokio::test]
async fn test_deferred_model_load_from_another_task() {
    let bookmarks = MockController::new(Bookmarks).with_deferred_load();
    let (manager, observer) = build_manager(vec![bookmarks.clone()], Duration::from_millis(1));
    let mut notifications = observer.subscribe();
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(manager.run(shutdown_rx));

    handle.configure(DataTypeSet::from([Bookmarks]), fixtures::new_client_context());
    assert_eq!(
        next_notification(&mut notifications).await,
        ConfigureNotification::Started
    );

    // The load callback is posted back from a different task.
    let loader = bookmarks.clone();
    tokio::spawn(async move {
        while !loader.has_pending_load() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        loader.complete_load(Ok(()));
    });

    assert!(matches!(
        next_notification(&mut notifications).await,
        ConfigureNotification::Done(_)
    ));

    shutdown_tx.send(()).unwrap();
    let manager = timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(manager.state(), ManagerState::Configured);
    assert_eq!(bookmarks.connect_count(), 1);
}
