//! Observability utilities for the cost estimation engine.
//!
//! This crate provides:
//! - Prometheus metrics recording and text rendering
//! - Estimation metrics (requests, durations, hidden dependencies, diagnostics)
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, render_metrics, EstimationMetrics};
//!
//! init_metrics();
//! EstimationMetrics::record_hidden_dependency("elastic_ip");
//! println!("{}", render_metrics());
//! ```

pub mod estimation;

pub use estimation::EstimationMetrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// Installs the recorder globally on first call; later calls return the same
/// handle. If another global recorder is already installed the handle still
/// renders, but stays empty.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => info!("Prometheus metrics recorder initialized"),
            Err(_) => warn!("A global metrics recorder is already installed"),
        }

        register_metric_descriptions();
        handle
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Render metrics in the Prometheus text format
pub fn render_metrics() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    describe_counter!(
        "cost_estimations_total",
        "Total estimation requests by provider and outcome"
    );
    describe_histogram!(
        "cost_estimation_duration_seconds",
        "End-to-end estimation duration in seconds"
    );
    describe_gauge!(
        "cost_estimation_resources",
        "Resources priced in the last estimation"
    );
    describe_counter!(
        "hidden_dependencies_resolved_total",
        "Virtual resources synthesized by child type"
    );
    describe_counter!(
        "cost_estimation_diagnostics_total",
        "Diagnostics attached to estimates by kind"
    );
}
