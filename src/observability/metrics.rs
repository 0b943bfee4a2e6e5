//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client resilience metrics (attempts, retries, fail-fast, breaker state)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `resilience_attempts_total` (counter): attempts by host, method, verdict
//! - `resilience_retries_total` (counter): retries scheduled by host, method
//! - `resilience_fail_fast_total` (counter): calls rejected by an open breaker
//! - `resilience_breaker_transitions_total` (counter): transitions by breaker, target state
//! - `resilience_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilience_call_duration_seconds` (histogram): end-to-end call latency by result
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users pay nothing
//! - Labels for host and logical method, never for full URLs

use std::net::SocketAddr;
use std::time::Duration;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::BreakerState;
use crate::resilience::types::{BreakerKey, Verdict};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(key: &BreakerKey, verdict: Verdict) {
    counter!(
        "resilience_attempts_total",
        "host" => key.host.clone(),
        "method" => key.method.clone(),
        "verdict" => verdict.as_str()
    )
    .increment(1);
}

pub fn record_retry(key: &BreakerKey) {
    counter!(
        "resilience_retries_total",
        "host" => key.host.clone(),
        "method" => key.method.clone()
    )
    .increment(1);
}

pub fn record_fail_fast(key: &BreakerKey) {
    counter!(
        "resilience_fail_fast_total",
        "host" => key.host.clone(),
        "method" => key.method.clone()
    )
    .increment(1);
}

pub fn record_breaker_transition(breaker: &str, to: BreakerState) {
    counter!(
        "resilience_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => to.as_str()
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_breaker_state(breaker: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    gauge!("resilience_breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_call_duration(key: &BreakerKey, result: &'static str, elapsed: Duration) {
    histogram!(
        "resilience_call_duration_seconds",
        "host" => key.host.clone(),
        "method" => key.method.clone(),
        "result" => result
    )
    .record(elapsed.as_secs_f64());
}
