//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → pipeline.rs (one span per call, attempt loop)
//!     → circuit_breaker.rs (admit: allow or fail fast per host + method)
//!     → timeouts.rs (per-attempt deadline around the transport)
//!     → classifier.rs (Success / Failure / Ignored verdict)
//!     → circuit_breaker.rs (record verdict, trip on failure rate)
//!     → retries.rs (rule chain + backoff.rs: retry or return)
//! ```
//!
//! # Design Decisions
//! - Breaker accounting and retry decisions are ordered rule chains (rules.rs)
//! - Fail-fast is terminal; it is never retried
//! - Requests the server never processed are retried and never counted
//! - The whole pipeline is also available as tower middleware (layer.rs)

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod layer;
pub mod pipeline;
pub mod retries;
pub mod rules;
pub mod timeouts;
pub mod types;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{Admission, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker, EventCount};
pub use classifier::{BreakerAction, CircuitBreakerRule, OutcomeClassifier};
pub use layer::{ResilienceLayer, ResilienceService};
pub use pipeline::{Execution, ResiliencePipeline};
pub use retries::{RetryAction, RetryDecision, RetryPolicy, RetryRule};
pub use rules::{Condition, MethodScope, Rule, RuleBuilder};
pub use types::{Attempt, AttemptOutcome, BreakerKey, ResilienceError, TransportError, Verdict};
