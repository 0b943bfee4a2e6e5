//! HTTP request/response handling subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → request.rs (RequestDescriptor: method, uri, headers, body, overrides)
//!     → [resilience pipeline admits, retries, classifies]
//!     → transport.rs (hyper-util client, body + trailers collected)
//!     → response.rs (UpstreamResponse, grpc-status lookup)
//!     → Caller
//! ```

pub mod request;
pub mod response;
pub mod transport;

pub use request::RequestDescriptor;
pub use response::{ResponseSummary, UpstreamResponse, GRPC_STATUS};
pub use transport::HttpTransport;
