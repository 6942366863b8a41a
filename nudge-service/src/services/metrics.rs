//! Metrics collection for nudge-service.
//!
//! HTTP metrics come from the `metrics` recorder; reminder counters live in a
//! separate Prometheus registry and are appended to the same scrape output.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static REMINDERS_SENT_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static BATCH_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize metrics collection. Called once from `main`.
pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let reminders_counter = IntCounterVec::new(
        Opts::new(
            "nudge_reminders_sent_total",
            "Reminder emails attempted, by kind and outcome",
        ),
        &["kind", "status"],
    )
    .expect("Failed to create nudge_reminders_sent_total metric");

    let batch_counter = IntCounterVec::new(
        Opts::new(
            "nudge_batch_runs_total",
            "Daily reminder batch runs, by outcome",
        ),
        &["status"],
    )
    .expect("Failed to create nudge_batch_runs_total metric");

    registry
        .register(Box::new(reminders_counter.clone()))
        .expect("Failed to register nudge_reminders_sent_total");
    registry
        .register(Box::new(batch_counter.clone()))
        .expect("Failed to register nudge_batch_runs_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    REMINDERS_SENT_TOTAL
        .set(reminders_counter)
        .expect("Failed to set nudge_reminders_sent_total");
    BATCH_RUNS_TOTAL
        .set(batch_counter)
        .expect("Failed to set nudge_batch_runs_total");
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// `kind` is `scheduled` for the batch, otherwise the manual send context
/// (`initial-send`, `send-next-reminder`, `manual-resend`). `status` is
/// `sent` or `failed`.
pub fn record_reminder(kind: &str, status: &str) {
    if let Some(counter) = REMINDERS_SENT_TOTAL.get() {
        counter.with_label_values(&[kind, status]).inc();
    }
}

pub fn record_batch_run(status: &str) {
    if let Some(counter) = BATCH_RUNS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}
