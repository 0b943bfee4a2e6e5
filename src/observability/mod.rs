//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience pipeline produces:
//!     → logging.rs (structured log events, one span per call with call_id)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr log stream
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Call ID flows through every attempt of a call via the tracing span
//! - Metrics are cheap (no-op until a recorder is installed)

pub mod logging;
pub mod metrics;
