//! Prometheus metrics for strategies, work items and worker pools.

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramOpts, HistogramVec, IntCounterVec,
};

const DEFAULT_BUCKETS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0,
];

// Requests per execution strategy
static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ral_requests_total",
        "The total number of aggregate requests per strategy",
        &["strategy"]
    )
    .expect("Failed to register prometheus metric: ral_requests_total")
});

// Outcome per strategy, `ok` or the error kind
static OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ral_request_outcome",
        "Aggregate request outcomes per strategy",
        &["strategy", "outcome"]
    )
    .expect("Failed to register prometheus metric: ral_request_outcome")
});

static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "ral_request_latency",
        "Aggregate request latency in milliseconds per strategy",
    )
    .buckets(DEFAULT_BUCKETS.to_vec());
    register_histogram_vec!(opts, &["strategy"])
        .expect("Failed to register prometheus metric: ral_request_latency")
});

static WORK_ITEM_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "ral_work_item_latency",
        "Work item latency in milliseconds per kind",
    )
    .buckets(DEFAULT_BUCKETS.to_vec());
    register_histogram_vec!(opts, &["kind", "outcome"])
        .expect("Failed to register prometheus metric: ral_work_item_latency")
});

static POOL_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ral_pool_submitted_total",
        "Tasks submitted per worker pool",
        &["pool"]
    )
    .expect("Failed to register prometheus metric: ral_pool_submitted_total")
});

static POOL_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ral_pool_rejected_total",
        "Tasks rejected per worker pool",
        &["pool", "policy"]
    )
    .expect("Failed to register prometheus metric: ral_pool_rejected_total")
});

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

pub fn observe_request(strategy: &str, outcome: &str, elapsed: Duration) {
    REQUESTS.with_label_values(&[strategy]).inc();
    OUTCOMES.with_label_values(&[strategy, outcome]).inc();
    REQUEST_LATENCY
        .with_label_values(&[strategy])
        .observe(millis(elapsed));
}

pub fn observe_work_item(kind: &str, outcome: &str, elapsed: Duration) {
    WORK_ITEM_LATENCY
        .with_label_values(&[kind, outcome])
        .observe(millis(elapsed));
}

pub fn record_submitted(pool: &str) {
    POOL_SUBMITTED.with_label_values(&[pool]).inc();
}

pub fn record_rejected(pool: &str, policy: &str) {
    POOL_REJECTED.with_label_values(&[pool, policy]).inc();
}
