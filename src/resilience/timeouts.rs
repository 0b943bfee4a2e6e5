//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each attempt with its deadline
//! - Cancel the in-flight transport future cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The deadline is per attempt, not per call; retries get a fresh one
//! - Timeout errors are distinct from other transport errors

use std::future::Future;
use std::time::Duration;

use crate::http::response::UpstreamResponse;
use crate::resilience::types::TransportError;

/// Run `fut` under an optional deadline.
pub async fn with_deadline<F>(deadline: Option<Duration>, fut: F) -> Result<UpstreamResponse, TransportError>
where
    F: Future<Output = Result<UpstreamResponse, TransportError>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        },
        None => fut.await,
    }
}
