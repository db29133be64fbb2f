//! Metrics module for subscription-service.
//! Provides Prometheus metrics for subscription lifecycle, usage and sweeps.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Repository call duration histogram
pub static REPOSITORY_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "subscription_repository_call_duration_seconds",
            "Repository call duration"
        ),
        &["operation"]
    )
    .expect("Failed to register REPOSITORY_CALL_DURATION")
});

/// Subscription operations counter (per-tenant metering)
pub static SUBSCRIPTION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Plan changes by direction and timing
pub static PLAN_CHANGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage counter updates
pub static USAGE_UPDATES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Sweep runs
pub static SWEEP_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Per-subscription sweep outcomes
pub static SWEEP_ITEMS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    SUBSCRIPTION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_operations_total",
                "Total subscription operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register SUBSCRIPTION_OPERATIONS_TOTAL")
    });

    PLAN_CHANGES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_plan_changes_total",
                "Plan changes by direction and timing"
            ),
            &["direction", "timing"]
        )
        .expect("Failed to register PLAN_CHANGES_TOTAL")
    });

    USAGE_UPDATES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_usage_updates_total",
                "Usage counter updates by dimension and operation"
            ),
            &["dimension", "operation"]
        )
        .expect("Failed to register USAGE_UPDATES_TOTAL")
    });

    SWEEP_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("subscription_sweep_runs_total", "Sweep runs by kind"),
            &["kind"]
        )
        .expect("Failed to register SWEEP_RUNS_TOTAL")
    });

    SWEEP_ITEMS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_sweep_items_total",
                "Subscriptions handled by sweeps, by kind and action"
            ),
            &["kind", "action"]
        )
        .expect("Failed to register SWEEP_ITEMS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_errors_total",
                "Total errors by type for alerting"
            ),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*REPOSITORY_CALL_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a subscription operation.
pub fn record_subscription_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = SUBSCRIPTION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record a plan change.
pub fn record_plan_change(direction: &str, timing: &str) {
    if let Some(counter) = PLAN_CHANGES_TOTAL.get() {
        counter.with_label_values(&[direction, timing]).inc();
    }
}

/// Record a usage update.
pub fn record_usage_update(dimension: &str, operation: &str) {
    if let Some(counter) = USAGE_UPDATES_TOTAL.get() {
        counter.with_label_values(&[dimension, operation]).inc();
    }
}

/// Record a sweep run.
pub fn record_sweep_run(kind: &str) {
    if let Some(counter) = SWEEP_RUNS_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

/// Record one sweep item outcome.
pub fn record_sweep_item(kind: &str, action: &str) {
    if let Some(counter) = SWEEP_ITEMS_TOTAL.get() {
        counter.with_label_values(&[kind, action]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
