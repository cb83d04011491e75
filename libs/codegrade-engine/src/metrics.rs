//! Prometheus metrics for the execution engine

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Executions by language and terminal state
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("codegrade_executions_total", "Executions by terminal state"),
        &["language", "state"]
    )
    .expect("metric can be created");

    pub static ref EXECUTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "codegrade_execution_duration_seconds",
            "Wall-clock time of the run step"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["language"]
    )
    .expect("metric can be created");

    pub static ref COMPILE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "codegrade_compile_duration_seconds",
            "Wall-clock time of the compile step"
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["language"]
    )
    .expect("metric can be created");

    pub static ref SUITES_TOTAL: IntCounter =
        IntCounter::new("codegrade_suites_total", "Test suites graded")
            .expect("metric can be created");

    pub static ref POOL_REJECTIONS: IntCounter = IntCounter::new(
        "codegrade_pool_rejections_total",
        "Requests rejected because no execution slot freed up in time"
    )
    .expect("metric can be created");

    pub static ref IN_FLIGHT: IntGauge =
        IntGauge::new("codegrade_in_flight", "Executions currently holding a slot")
            .expect("metric can be created");

    pub static ref WORKSPACE_CLEANUP_FAILURES: IntCounter = IntCounter::new(
        "codegrade_workspace_cleanup_failures_total",
        "Workspace directories that could not be removed"
    )
    .expect("metric can be created");
}

static REGISTER: Once = Once::new();

/// Register all collectors with `REGISTRY`. Safe to call repeatedly.
pub fn init_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(EXECUTIONS_TOTAL.clone()),
            Box::new(EXECUTION_DURATION.clone()),
            Box::new(COMPILE_DURATION.clone()),
            Box::new(SUITES_TOTAL.clone()),
            Box::new(POOL_REJECTIONS.clone()),
            Box::new(IN_FLIGHT.clone()),
            Box::new(WORKSPACE_CLEANUP_FAILURES.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!(error = %e, "Failed to register metric");
            }
        }
    });
}

/// Text exposition of every registered metric
pub fn render() -> String {
    init_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_engine_metrics() {
        EXECUTIONS_TOTAL.with_label_values(&["python", "completed"]).inc();
        SUITES_TOTAL.inc();

        let text = render();
        assert!(text.contains("codegrade_executions_total"));
        assert!(text.contains("codegrade_suites_total"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(!render().is_empty());
    }
}
