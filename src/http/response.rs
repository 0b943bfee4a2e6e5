//! Upstream response representation.
//!
//! # Responsibilities
//! - Hold a fully aggregated response (status, headers, body, trailers)
//! - Expose the in-band gRPC status for classification
//!
//! # Design Decisions
//! - The body is collected before classification, so rules may inspect trailers
//! - Trailers win over headers (trailers-only gRPC responses carry the status in headers)

use hyper::body::Bytes;
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::resilience::types::ResilienceError;

pub const GRPC_STATUS: &str = "grpc-status";

/// A completed upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: Option<HeaderMap>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            trailers: None,
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_trailers(mut self, trailers: HeaderMap) -> Self {
        self.trailers = Some(trailers);
        self
    }

    /// The gRPC status riding in trailers (or headers), if any.
    pub fn grpc_status(&self) -> Option<i32> {
        self.trailers
            .as_ref()
            .and_then(|t| t.get(GRPC_STATUS))
            .or_else(|| self.headers.get(GRPC_STATUS))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Turn a 5xx response into a `ServerError`.
    pub fn error_for_status(self) -> Result<Self, ResilienceError> {
        if self.status.is_server_error() {
            Err(ResilienceError::ServerError { status: self.status })
        } else {
            Ok(self)
        }
    }

    pub fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            status: self.status.as_u16(),
            grpc_status: self.grpc_status(),
            body_bytes: self.body.len(),
        }
    }
}

/// Serializable view of a response, used for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSummary {
    pub status: u16,
    pub grpc_status: Option<i32>,
    pub body_bytes: usize,
}
