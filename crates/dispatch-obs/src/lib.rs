//! Observability for a dispatch run: in-flight gauge, outcome counters, request latency

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, IntCounterVec, IntGauge, TextEncoder};

const LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0];

static IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| prometheus::register_int_gauge!("dispatch_inflight_requests", "Requests admitted and awaiting a reply").expect("gauge"));
static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| prometheus::register_int_counter_vec!("dispatch_requests_total", "Finished requests by outcome", &["outcome"]).expect("counter"));
static LATENCY: Lazy<Histogram> = Lazy::new(|| prometheus::register_histogram!("dispatch_request_seconds", "Wall time per request", LATENCY_BUCKETS.to_vec()).expect("histogram"));
static ENCODER: Lazy<TextEncoder> = Lazy::new(TextEncoder::new);

pub fn init() {
    let _ = &*IN_FLIGHT;
    let _ = &*REQUESTS;
    let _ = &*LATENCY;
}

/// Marks one request in flight until the returned guard is dropped.
pub fn request_started() -> InFlightRequest {
    IN_FLIGHT.inc();
    InFlightRequest { started: Instant::now(), finished: false }
}

/// Holds the in-flight gauge up. A guard dropped before `finish` counts as
/// a cancelled request.
#[must_use]
pub struct InFlightRequest {
    started: Instant,
    finished: bool,
}

impl InFlightRequest {
    /// Records the outcome and latency; returns the elapsed time.
    pub fn finish(mut self, succeeded: bool) -> Duration {
        let elapsed = self.started.elapsed();
        self.finished = true;
        REQUESTS.with_label_values(&[if succeeded { "success" } else { "error" }]).inc();
        LATENCY.observe(elapsed.as_secs_f64());
        elapsed
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        IN_FLIGHT.dec();
        if !self.finished {
            REQUESTS.with_label_values(&["cancelled"]).inc();
        }
    }
}

pub fn in_flight() -> i64 { IN_FLIGHT.get() }

pub fn finished(outcome: &str) -> u64 { REQUESTS.with_label_values(&[outcome]).get() }

/// Prometheus text exposition of everything registered in the default registry.
pub fn render() -> String {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = ENCODER.encode(&families, &mut buffer) {
        tracing::warn!(target: "dispatch", "failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
