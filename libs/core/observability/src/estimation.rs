//! Estimation-specific metrics.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Estimation metrics recorder
pub struct EstimationMetrics;

impl EstimationMetrics {
    /// Record a finished estimation request
    pub fn record_estimation(provider: &str, status: &str, resources: usize, duration: Duration) {
        counter!(
            "cost_estimations_total",
            "provider" => provider.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("cost_estimation_duration_seconds", "provider" => provider.to_string())
            .record(duration.as_secs_f64());
        gauge!("cost_estimation_resources", "provider" => provider.to_string())
            .set(resources as f64);

        tracing::debug!(
            provider = provider,
            status = status,
            resources = resources,
            duration_ms = duration.as_millis() as u64,
            "Recorded estimation"
        );
    }

    /// Record a virtual resource synthesized from a dependency rule
    pub fn record_hidden_dependency(child_type: &str) {
        counter!("hidden_dependencies_resolved_total", "child_type" => child_type.to_string())
            .increment(1);
    }

    /// Record a diagnostic attached to an estimate
    pub fn record_diagnostic(kind: &str) {
        counter!("cost_estimation_diagnostics_total", "kind" => kind.to_string()).increment(1);
    }
}
