//! Prometheus metrics for the data type manager.
//!
//! This module provides metrics for:
//! - Configuration cycles (duration, outcome, batches issued)
//! - Requested data types
//! - Per data type failures by kind

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Configuration Metrics
// =============================================================================

/// Duration of a configuration cycle, from restart until done.
pub static CONFIGURE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "typesync_configure_duration_seconds",
            "Duration of data type configuration cycles",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["cycle", "status"], // cycle: "initial", "subsequent"; status: "ok", "aborted"
    )
    .unwrap()
});

/// Configuration batches handed to the configurer.
pub static CONFIGURE_BATCHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "typesync_configure_batches_total",
        "Total configuration batches issued to the engine",
    )
    .unwrap()
});

/// Restarts triggered while a configuration was in flight.
pub static RECONFIGURATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "typesync_reconfigurations_total",
        "Total deferred reconfigurations processed",
    )
    .unwrap()
});

// =============================================================================
// Data Type Metrics
// =============================================================================

/// Data types requested by user-triggered configurations.
pub static CONFIGURE_DATA_TYPES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "typesync_configure_data_types_total",
            "Data types requested by user-triggered configurations",
        ),
        &["data_type"],
    )
    .unwrap()
});

/// Data type failures recorded in the status table.
pub static DATA_TYPE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "typesync_data_type_errors_total",
            "Data type failures recorded during configuration",
        ),
        &["data_type", "kind"], // kind: "fatal", "crypto", "unready", "policy"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONFIGURE_DURATION.clone()),
        Box::new(CONFIGURE_BATCHES.clone()),
        Box::new(RECONFIGURATIONS.clone()),
        Box::new(CONFIGURE_DATA_TYPES.clone()),
        Box::new(DATA_TYPE_ERRORS.clone()),
    ]
}

/// Register all core metrics with `registry`.
pub fn register_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    for collector in all_metrics() {
        registry.register(collector)?;
    }
    Ok(())
}
