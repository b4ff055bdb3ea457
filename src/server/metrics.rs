use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all executor metrics
const PREFIX: &str = "trigger_executor";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Trigger Metrics
    pub static ref TRIGGERS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_triggers_total"), "Triggers by terminal outcome"),
        &["outcome"]
    ).expect("Failed to create triggers_total metric");

    pub static ref TRIGGER_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_trigger_duration_seconds"),
            "Time from job body start to terminal state"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0])
    ).expect("Failed to create trigger_duration_seconds metric");

    pub static ref LIVE_TRIGGERS: Gauge = Gauge::new(
        format!("{PREFIX}_live_triggers"),
        "Triggers currently in the live table"
    ).expect("Failed to create live_triggers metric");

    // Notification Metrics
    pub static ref NOTIFY_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notify_attempts_total"), "Completion delivery attempts"),
        &["result"]
    ).expect("Failed to create notify_attempts_total metric");

    // Timer Metrics
    pub static ref TIMER_EXHAUSTED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_timer_exhausted_total"),
        "Scheduled items dropped after exhausting their retries"
    ).expect("Failed to create timer_exhausted_total metric");

    pub static ref TIMER_QUEUE_DEPTH: Gauge = Gauge::new(
        format!("{PREFIX}_timer_queue_depth"),
        "Items waiting in the timer queue"
    ).expect("Failed to create timer_queue_depth metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Already-registered errors are expected when called more than once (tests)
    let _ = REGISTRY.register(Box::new(TRIGGERS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRIGGER_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(LIVE_TRIGGERS.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFY_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TIMER_EXHAUSTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TIMER_QUEUE_DEPTH.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a trigger reaching a terminal state.
///
/// `outcome` is one of `success`, `failed`, `interrupted`.
pub fn record_trigger_finished(outcome: &str, duration: Option<Duration>) {
    TRIGGERS_TOTAL.with_label_values(&[outcome]).inc();
    if let Some(duration) = duration {
        TRIGGER_DURATION_SECONDS.observe(duration.as_secs_f64());
    }
}

pub fn set_live_triggers(count: usize) {
    LIVE_TRIGGERS.set(count as f64);
}

/// Record a completion delivery attempt, `result` is `delivered` or `failed`.
pub fn record_notify_attempt(result: &str) {
    NOTIFY_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_timer_item_exhausted() {
    TIMER_EXHAUSTED_TOTAL.inc();
}

pub fn set_timer_queue_depth(depth: usize) {
    TIMER_QUEUE_DEPTH.set(depth as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
