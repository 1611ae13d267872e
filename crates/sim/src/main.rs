mod metrics;
mod sim;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use typesync_core::{
    load_config, validate_config, BoxedController, BroadcastObserver, Config,
    ConfigureNotification, ConfigureResult, ConfigureStatus, DataTypeManager, DataTypeSet,
    ManagerState,
};

use sim::{SimController, SimEncryption, SimEngine};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of one simulated configuration.
#[derive(Debug, Serialize)]
struct Report {
    result: ConfigureResult,
    state: ManagerState,
    active_types: DataTypeSet,
    proxy_types: DataTypeSet,
    permanent_errors: DataTypeSet,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("typesync-sim {}", VERSION);

    // Determine config path
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TYPESYNC_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("typesync.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Account: {}", config.account.account_id);
    info!("Registered types: {}", config.scenario.registered_types());

    let report = tokio::select! {
        report = run_scenario(&config) => report?,
        _ = shutdown_signal() => {
            warn!("Interrupted before configuration finished");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    if config.manager.record_metrics {
        eprintln!("{}", metrics::encode_metrics()?);
    }

    if report.result.status != ConfigureStatus::Ok {
        bail!("Configuration finished with status {}", report.result.status);
    }
    Ok(())
}

/// Run the manager against the simulated collaborators until the first
/// configuration cycle finishes.
async fn run_scenario(config: &Config) -> Result<Report> {
    let scenario = &config.scenario;

    let controllers: Vec<BoxedController> = scenario
        .controllers
        .iter()
        .cloned()
        .map(|c| Box::new(SimController::new(c)) as BoxedController)
        .collect();

    let observer = BroadcastObserver::new(config.manager.notification_capacity);
    let mut notifications = observer.subscribe();

    let mut manager = DataTypeManager::new(
        config.manager.clone(),
        controllers,
        Box::new(SimEncryption::from_scenario(scenario)),
        Box::new(observer),
    )
    .context("Failed to create data type manager")?;

    let engine = SimEngine::new(
        Duration::from_millis(scenario.engine_latency_ms),
        scenario.engine_failures,
    );
    manager
        .set_configurer(Box::new(engine))
        .context("Failed to set configurer")?;

    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let manager_task = tokio::spawn(manager.run(shutdown_rx));

    handle.configure(
        scenario.preferred_types,
        config.account.context(scenario.reason),
    );

    let result = loop {
        match notifications.recv().await {
            Ok(ConfigureNotification::Started) => info!("Configuration started"),
            Ok(ConfigureNotification::Done(result)) => break result,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Missed {} configure notifications", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                bail!("Data type manager exited before configuration finished");
            }
        }
    };

    let _ = shutdown_tx.send(());
    let manager = manager_task
        .await
        .context("Data type manager task failed")?;

    Ok(Report {
        result,
        state: manager.state(),
        active_types: manager.active_data_types(),
        proxy_types: manager.active_proxy_data_types(),
        permanent_errors: manager.data_types_with_permanent_errors(),
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesync_core::{load_config_from_str, DataType, ErrorKind};

    #[tokio::test]
    async fn test_run_scenario_with_failures() {
        let config = load_config_from_str(
            r#"
[manager]
record_metrics = false

[account]
account_id = "sim@example.com"
cache_guid = "sim-guid"

[scenario]
preferred_types = ["bookmarks", "passwords", "history", "sessions"]
engine_latency_ms = 1
engine_failures = ["history"]
crypto_error = true
encrypted_types = ["passwords"]

[[scenario.controllers]]
data_type = "bookmarks"
initial_sync_done = false
load_latency_ms = 2

[[scenario.controllers]]
data_type = "passwords"

[[scenario.controllers]]
data_type = "history"
initial_sync_done = false

[[scenario.controllers]]
data_type = "sessions"
proxy = true
"#,
        )
        .unwrap();
        tokio_test::assert_ok!(validate_config(&config));

        let report = run_scenario(&config).await.unwrap();

        assert_eq!(report.result.status, ConfigureStatus::Ok);
        assert_eq!(report.state, ManagerState::Configured);
        assert_eq!(
            report.active_types,
            DataTypeSet::from([DataType::Nigori, DataType::Bookmarks, DataType::Sessions])
        );
        assert_eq!(report.proxy_types, DataTypeSet::from([DataType::Sessions]));
        assert_eq!(
            report.permanent_errors,
            DataTypeSet::from([DataType::History])
        );
        assert_eq!(
            report
                .result
                .status_table
                .error_for(DataType::Passwords)
                .map(|e| e.kind),
            Some(ErrorKind::Crypto)
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "configured");
        assert_eq!(json["result"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_run_scenario_control_types_only() {
        let config = load_config_from_str(
            r#"
[manager]
record_metrics = false

[scenario]
engine_latency_ms = 0
"#,
        )
        .unwrap();

        let report = run_scenario(&config).await.unwrap();
        assert_eq!(report.result.status, ConfigureStatus::Ok);
        assert_eq!(report.active_types, DataTypeSet::from([DataType::Nigori]));
    }
}
