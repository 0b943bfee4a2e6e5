//! Client-side resilience for outbound HTTP/RPC calls.
//!
//! Wraps any transport with a per host and method circuit breaker and a
//! rule-based retry policy with exponential backoff.

pub mod config;
pub mod http;
pub mod observability;
pub mod resilience;

pub use config::schema::ClientConfig;
pub use http::{HttpTransport, RequestDescriptor, UpstreamResponse};
pub use resilience::{ResilienceError, ResilienceLayer, ResiliencePipeline};
