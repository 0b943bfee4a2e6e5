//! Shared resilience types and error definitions.

use std::fmt;
use std::time::Duration;
use hyper::StatusCode;
use thiserror::Error;

use crate::http::response::UpstreamResponse;

/// Partition of circuit breaker state: destination host + logical method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakerKey {
    pub host: String,
    pub method: String,
}

impl BreakerKey {
    pub fn new(host: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for BreakerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.host, self.method)
    }
}

/// Verdict of one attempt, as far as the circuit breaker is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Success,
    Failure,
    /// Neither success nor failure: the server never acted on the request.
    Ignored,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Success => "success",
            Verdict::Failure => "failure",
            Verdict::Ignored => "ignored",
        }
    }
}

/// Errors raised by a transport while sending one attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The connection was never established; the server cannot have seen the request.
    #[error("connect error: {0}")]
    Connect(String),

    /// The attempt exceeded its deadline.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The request failed after it may have reached the server.
    #[error("request error: {0}")]
    Request(String),

    /// The response body or trailers could not be read.
    #[error("body error: {0}")]
    Body(String),
}

impl TransportError {
    /// True when the transport can prove the server never processed the request.
    pub fn is_unprocessed(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

/// Observable outcome of one attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Response(UpstreamResponse),
    Transport(TransportError),
    /// The breaker rejected the attempt before any transport call.
    FailFast(BreakerKey),
}

impl AttemptOutcome {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AttemptOutcome::Response(response) => Some(response.status),
            _ => None,
        }
    }
}

/// One execution try of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// 0-based attempt index.
    pub index: u32,
    pub verdict: Verdict,
    pub elapsed: Duration,
    pub status: Option<StatusCode>,
    /// Set when the attempt ended with a transport error or a fail-fast rejection.
    pub error: Option<String>,
}

/// Terminal errors surfaced to the caller.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// The breaker for this destination is open; nothing was sent.
    #[error("circuit breaker '{key}' is open; request rejected without being sent")]
    FailFast { key: BreakerKey },

    /// The last attempt failed at the network level.
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        #[source]
        source: TransportError,
        attempts: u32,
    },

    /// The upstream answered with a server-error status.
    #[error("upstream returned server error {status}")]
    ServerError { status: StatusCode },

    /// The exchange succeeded but carried a failing in-band status.
    #[error("upstream reported partial failure (grpc-status {grpc_status})")]
    PartialFailure { grpc_status: i32 },
}

impl ResilienceError {
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, ResilienceError::FailFast { .. })
    }
}
