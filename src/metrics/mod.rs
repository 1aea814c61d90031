
use std::sync::Once;
use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

lazy_static! {
    pub static ref LOCK_ACQUIRE_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("lock_acquire_latency_ms", "Histogram of lock acquisition latency in ms")
            .buckets(exponential_buckets(0.5, 2.0, 16).expect("valid bucket layout")),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref LOCK_TIMEOUTS: IntCounter =
        IntCounter::new("lock_timeouts_total", "Lock waits that ran out of time")
            .expect("metric can not be created");

    pub static ref LOCK_RELEASE_FAILURES: IntCounter =
        IntCounter::new("lock_release_failures_total", "Lock releases rejected by the backend")
            .expect("metric can not be created");

    pub static ref STOCK_DECREASE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("stock_decrease_total", "Stock decrease requests by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(LOCK_ACQUIRE_LATENCY_MS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LOCK_TIMEOUTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LOCK_RELEASE_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STOCK_DECREASE_TOTAL.clone()))
        .expect("collector can be registered");
}

fn ensure_registered() {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));
}

pub(crate) fn observe_acquire(
    started: Instant,
    outcome: &str,
) {
    ensure_registered();
    LOCK_ACQUIRE_LATENCY_MS
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64() * 1000.0);
}

pub(crate) fn record_decrease(outcome: &str) {
    ensure_registered();
    STOCK_DECREASE_TOTAL.with_label_values(&[outcome]).inc();
}

/// Text exposition of every lock and stock metric
pub fn gather_metrics() -> String {
    ensure_registered();
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
        return String::default();
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
