use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

use crate::models::ExecutionStatus;

lazy_static! {
    pub static ref SERVICE_UP: IntGauge = register_int_gauge!(
        "notebook_datasource_up",
        "Whether the data source service is up (1) or down (0)"
    ).unwrap();

    // Query metrics
    pub static ref QUERY_COUNTER: IntCounter = register_int_counter!(
        "notebook_queries_total",
        "Total number of queries received"
    ).unwrap();

    pub static ref QUERY_FAILURES: IntCounter = register_int_counter!(
        "notebook_query_failures_total",
        "Total number of queries that returned an error"
    ).unwrap();

    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        "notebook_query_duration_seconds",
        "Query duration in seconds",
        vec![0.1, 0.5, 1.0, 3.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    pub static ref FRAMES_PRODUCED: IntCounter = register_int_counter!(
        "notebook_frames_produced_total",
        "Total number of frames returned to callers"
    ).unwrap();

    // Execution metrics
    pub static ref EXECUTIONS_SUBMITTED: IntCounter = register_int_counter!(
        "notebook_executions_submitted_total",
        "Total number of notebook executions created"
    ).unwrap();

    pub static ref EXECUTION_POLLS: IntCounter = register_int_counter!(
        "notebook_execution_polls_total",
        "Total number of execution status fetches"
    ).unwrap();

    pub static ref EXECUTIONS_FINISHED: IntCounterVec = register_int_counter_vec!(
        "notebook_executions_finished_total",
        "Executions that reached a terminal status",
        &["status"]
    ).unwrap();
}

pub fn init_metrics() {
    SERVICE_UP.set(1);
}

/// Observes the duration of one query when dropped.
pub struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    pub fn new() -> Self {
        QUERY_COUNTER.inc();
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for QueryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        QUERY_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_submission() {
    EXECUTIONS_SUBMITTED.inc();
}

pub fn record_poll() {
    EXECUTION_POLLS.inc();
}

pub fn record_finished(status: ExecutionStatus) {
    EXECUTIONS_FINISHED
        .with_label_values(&[&status.to_string()])
        .inc();
}

pub fn record_frames(count: usize) {
    FRAMES_PRODUCED.inc_by(count as u64);
}

pub fn record_query_failure() {
    QUERY_FAILURES.inc();
}

/// Render the default registry in the Prometheus text format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
