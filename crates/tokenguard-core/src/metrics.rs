//! Prometheus metrics for TokenGuard.
//!
//! - `tokenguard_requests_total{outcome}`: requests by gateway outcome
//!   (`allowed`, `denied`, `malformed`, `upstream_error`, `store_unavailable`)
//! - `tokenguard_denials_total{gate}`: admission denials by gate
//! - `tokenguard_degraded_total`: admissions decided in fail-open mode
//! - `tokenguard_reconciliations_total{result}`: reconciliation outcomes
//! - `tokenguard_request_duration_seconds`: gateway latency histogram
//! - `tokenguard_uptime_seconds`: process uptime

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use parking_lot::{const_mutex, Mutex};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_START_TIME: OnceLock<Instant> = OnceLock::new();
static INIT_LOCK: Mutex<()> = const_mutex(());

/// Generation latency is bimodal: sub-second short answers and long
/// multi-second generations.
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Install the global Prometheus recorder. Later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let _guard = INIT_LOCK.lock();
    let _ = METRICS_START_TIME.get_or_init(Instant::now);

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().set_buckets(LATENCY_BUCKETS)?.install_recorder()?;

    describe_counter!("tokenguard_requests_total", "Requests handled by the gateway, by outcome");
    describe_counter!("tokenguard_denials_total", "Admission denials, by gate");
    describe_counter!(
        "tokenguard_degraded_total",
        "Admissions allowed because the usage store was unavailable"
    );
    describe_counter!(
        "tokenguard_reconciliations_total",
        "Estimate/actual reconciliations, by result"
    );
    describe_histogram!(
        "tokenguard_request_duration_seconds",
        "Gateway request duration in seconds"
    );
    describe_gauge!("tokenguard_uptime_seconds", "Server uptime in seconds");

    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    Ok(handle)
}

/// Returns None if metrics have not been initialized.
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

pub fn record_request(outcome: &'static str, duration: Duration) {
    counter!("tokenguard_requests_total", "outcome" => outcome).increment(1);
    histogram!("tokenguard_request_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

pub fn record_denial(gate: &'static str) {
    counter!("tokenguard_denials_total", "gate" => gate).increment(1);
}

pub fn record_degraded() {
    counter!("tokenguard_degraded_total").increment(1);
}

pub fn record_reconciliation(result: &'static str) {
    counter!("tokenguard_reconciliations_total", "result" => result).increment(1);
}

/// Should be called on render.
pub fn update_uptime_gauge() {
    if let Some(start) = METRICS_START_TIME.get() {
        gauge!("tokenguard_uptime_seconds").set(start.elapsed().as_secs_f64());
    }
}

/// Render the exposition text, or `None` before [`init_metrics`].
pub fn render() -> Option<String> {
    update_uptime_gauge();
    get_prometheus_handle().map(PrometheusHandle::render)
}
