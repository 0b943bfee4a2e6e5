//! Call orchestration.
//!
//! # Responsibilities
//! - Run one logical call as a sequence of attempts
//! - Consult the breaker before every attempt, record every completed verdict
//! - Ask the retry policy after every attempt and sleep for the backoff
//!
//! # Data Flow
//! ```text
//! execute(request)
//!     → breaker.admit()          FailFast → Err(FailFast), no transport call
//!     → transport (under deadline)
//!     → classifier.classify()    → breaker.record(verdict)
//!     → retry.decide()           NoRetry → return last outcome
//!                                RetryAfter(d) → sleep(d), next attempt
//! ```
//!
//! # Design Decisions
//! - Policies live behind an `ArcSwap`; a call keeps the snapshot it started with
//! - Admit and record are separate critical sections on the breaker
//! - Any HTTP response, including 5xx, is returned as `Ok`; callers decide
//!   with `UpstreamResponse::error_for_status` or `OutcomeClassifier::failure_of`
//! - Dropping the future cancels the call; an unfinished attempt records nothing

use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use tokio::time::Instant;
use tower::{Service, ServiceExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::validation::validate_config;
use crate::config::{ClientConfig, ConfigError};
use crate::http::request::RequestDescriptor;
use crate::http::response::UpstreamResponse;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Admission, BreakerRegistry};
use crate::resilience::classifier::OutcomeClassifier;
use crate::resilience::retries::{RetryDecision, RetryPolicy};
use crate::resilience::timeouts::with_deadline;
use crate::resilience::types::{Attempt, AttemptOutcome, BreakerKey, ResilienceError, TransportError, Verdict};

/// The policies a call runs under; swapped as a unit on reload.
#[derive(Debug)]
struct Policies {
    classifier: OutcomeClassifier,
    retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl Policies {
    fn from_config(config: &ClientConfig) -> Self {
        Self {
            classifier: OutcomeClassifier::new(&config.classifier),
            retry: RetryPolicy::from_config(&config.retries, config.classifier.timeout_is_unprocessed),
            attempt_timeout: config.timeouts.attempt(),
        }
    }
}

/// Result of a call together with its attempt history.
#[derive(Debug)]
pub struct Execution {
    pub result: Result<UpstreamResponse, ResilienceError>,
    pub attempts: Vec<Attempt>,
}

/// Circuit breaker + retry orchestration around a transport service.
pub struct ResiliencePipeline<T> {
    transport: T,
    breakers: Arc<BreakerRegistry>,
    policies: ArcSwap<Policies>,
}

impl<T> ResiliencePipeline<T>
where
    T: Service<RequestDescriptor, Response = UpstreamResponse, Error = TransportError> + Clone + Send + Sync + 'static,
    T::Future: Send,
{
    /// Validate `config` and build the default policies around `transport`.
    pub fn new(config: &ClientConfig, transport: T) -> Result<Self, ConfigError> {
        validate_config(config)?;
        Ok(Self::from_validated(config, transport))
    }

    pub(crate) fn from_validated(config: &ClientConfig, transport: T) -> Self {
        Self {
            transport,
            breakers: Arc::new(BreakerRegistry::new(config.breaker.clone())),
            policies: ArcSwap::from_pointee(Policies::from_config(config)),
        }
    }

    /// Build with custom classifier and retry rule chains.
    pub fn with_policies(
        config: &ClientConfig,
        transport: T,
        classifier: OutcomeClassifier,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        validate_config(config)?;
        Ok(Self {
            transport,
            breakers: Arc::new(BreakerRegistry::new(config.breaker.clone())),
            policies: ArcSwap::from_pointee(Policies {
                classifier,
                retry,
                attempt_timeout: config.timeouts.attempt(),
            }),
        })
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Classifier of the current configuration.
    pub fn classifier(&self) -> OutcomeClassifier {
        self.policies.load().classifier.clone()
    }

    /// Apply a new configuration. Calls in flight finish under the old policies.
    pub fn reload(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        self.policies.store(Arc::new(Policies::from_config(config)));
        self.breakers.reconfigure(config.breaker.clone());
        tracing::info!("Resilience policies reloaded");
        Ok(())
    }

    /// Execute a call; only the final attempt's outcome is returned.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<UpstreamResponse, ResilienceError> {
        self.execute_traced(request).await.result
    }

    /// Execute a call and keep the per-attempt history.
    pub async fn execute_traced(&self, request: RequestDescriptor) -> Execution {
        let call_id = Uuid::new_v4();
        let key = request.breaker_key();
        let span = tracing::info_span!(
            "resilient_call",
            %call_id,
            host = %key.host,
            method = %key.method,
        );
        self.run(request, key).instrument(span).await
    }

    async fn run(&self, request: RequestDescriptor, key: BreakerKey) -> Execution {
        let policies = self.policies.load_full();
        let breaker = self.breakers.get(&key);
        let call_started = Instant::now();
        let mut attempts = Vec::new();
        let mut attempt_index: u32 = 0;

        loop {
            let attempt_started = Instant::now();

            if breaker.admit() == Admission::FailFast {
                metrics::record_fail_fast(&key);
                tracing::warn!(
                    attempt = attempt_index,
                    breaker = breaker.name(),
                    "Circuit open, failing fast"
                );
                let error = ResilienceError::FailFast { key: key.clone() };
                attempts.push(Attempt {
                    index: attempt_index,
                    verdict: Verdict::Ignored,
                    elapsed: attempt_started.elapsed(),
                    status: None,
                    error: Some(error.to_string()),
                });
                return finish(&key, call_started, Err(error), attempts);
            }

            let call = self.transport.clone().oneshot(request.clone());
            let outcome = match with_deadline(policies.attempt_timeout, call).await {
                Ok(response) => AttemptOutcome::Response(response),
                Err(e) => AttemptOutcome::Transport(e),
            };

            let verdict = policies.classifier.classify(&outcome);
            breaker.record(verdict);
            metrics::record_attempt(&key, verdict);

            let elapsed = attempt_started.elapsed();
            let error = match &outcome {
                AttemptOutcome::Transport(e) => Some(e.to_string()),
                _ => None,
            };
            tracing::debug!(
                attempt = attempt_index,
                verdict = verdict.as_str(),
                status = ?outcome.status(),
                error = ?error,
                elapsed_ms = elapsed.as_millis() as u64,
                "Attempt completed"
            );
            attempts.push(Attempt {
                index: attempt_index,
                verdict,
                elapsed,
                status: outcome.status(),
                error,
            });

            match policies.retry.decide(&request, attempt_index, &outcome) {
                RetryDecision::NoRetry => {
                    let result = into_result(outcome, attempt_index + 1);
                    return finish(&key, call_started, result, attempts);
                }
                RetryDecision::RetryAfter(delay) => {
                    metrics::record_retry(&key);
                    tracing::info!(
                        attempt = attempt_index,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::RetryImmediately => {
                    metrics::record_retry(&key);
                    tracing::info!(attempt = attempt_index, "Retrying immediately");
                }
            }

            attempt_index += 1;
        }
    }
}

fn into_result(outcome: AttemptOutcome, attempts: u32) -> Result<UpstreamResponse, ResilienceError> {
    match outcome {
        AttemptOutcome::Response(response) => Ok(response),
        AttemptOutcome::Transport(source) => Err(ResilienceError::Transport { source, attempts }),
        AttemptOutcome::FailFast(key) => Err(ResilienceError::FailFast { key }),
    }
}

fn finish(
    key: &BreakerKey,
    started: Instant,
    result: Result<UpstreamResponse, ResilienceError>,
    attempts: Vec<Attempt>,
) -> Execution {
    let label = match &result {
        Ok(_) => "response",
        Err(e) if e.is_fail_fast() => "fail_fast",
        Err(_) => "error",
    };
    metrics::record_call_duration(key, label, started.elapsed());
    Execution { result, attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use hyper::{Method, StatusCode};
    use tower::service_fn;
    use crate::config::{BreakerConfig, RetryConfig};
    use crate::resilience::circuit_breaker::BreakerState;

    type Script = Arc<Mutex<VecDeque<Result<UpstreamResponse, TransportError>>>>;

    /// Transport replaying scripted outcomes; falls back to 200 when exhausted.
    fn scripted(
        outcomes: Vec<Result<UpstreamResponse, TransportError>>,
        calls: Arc<AtomicUsize>,
    ) -> impl Service<RequestDescriptor, Response = UpstreamResponse, Error = TransportError, Future = impl Send>
           + Clone
           + Send
           + Sync
           + 'static {
        let script: Script = Arc::new(Mutex::new(outcomes.into()));
        service_fn(move |_req: RequestDescriptor| {
            let script = script.clone();
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let next = script.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Ok(UpstreamResponse::new(StatusCode::OK)))
            }
        })
    }

    fn config(max_retries: u32) -> ClientConfig {
        ClientConfig {
            breaker: BreakerConfig {
                minimum_request_threshold: 3,
                failure_rate_threshold: 1.0,
                open_cooldown_ms: 10_000,
                ..Default::default()
            },
            retries: RetryConfig {
                max_retries,
                jitter: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn status(code: StatusCode) -> Result<UpstreamResponse, TransportError> {
        Ok(UpstreamResponse::new(code))
    }

    fn get() -> RequestDescriptor {
        RequestDescriptor::get("http://api.local/items".parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_trip_breaker_then_fail_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
            ],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(0), transport).unwrap();

        for _ in 0..3 {
            let response = pipeline.execute(get()).await.unwrap();
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let err = pipeline.execute(get()).await.unwrap_err();
        assert!(err.is_fail_fast());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let breaker = pipeline.breakers().get(&get().breaker_key());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_retried_after_service_unavailable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![status(StatusCode::SERVICE_UNAVAILABLE), status(StatusCode::OK)],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(1), transport).unwrap();

        let execution = pipeline.execute_traced(get()).await;
        assert_eq!(execution.result.unwrap().status, StatusCode::OK);
        assert_eq!(execution.attempts.len(), 2);
        assert_eq!(execution.attempts[0].verdict, Verdict::Failure);
        assert_eq!(execution.attempts[1].verdict, Verdict::Success);
        assert_eq!(execution.attempts[1].index, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_retried_when_unprocessed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![Err(TransportError::Connect("connection refused".into())), status(StatusCode::CREATED)],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(1), transport).unwrap();

        let request = RequestDescriptor::post("http://api.local/items".parse().unwrap(), "{}");
        let execution = pipeline.execute_traced(request).await;
        assert_eq!(execution.result.unwrap().status, StatusCode::CREATED);
        assert_eq!(execution.attempts[0].verdict, Verdict::Ignored);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_server_error_returned_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(vec![status(StatusCode::BAD_GATEWAY)], calls.clone());
        let pipeline = ResiliencePipeline::new(&config(3), transport).unwrap();

        let request = RequestDescriptor::new(Method::POST, "http://api.local/items".parse().unwrap());
        let response = pipeline.execute(request).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert!(response.error_for_status().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_after_retries_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![
                Err(TransportError::Request("connection reset".into())),
                Err(TransportError::Request("connection reset".into())),
                Err(TransportError::Request("connection reset".into())),
            ],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(2), transport).unwrap();

        let err = pipeline.execute(get()).await.unwrap_err();
        assert!(matches!(err, ResilienceError::Transport { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let transport = service_fn(|_req: RequestDescriptor| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, TransportError>(UpstreamResponse::new(StatusCode::OK))
        });
        let mut cfg = config(0);
        cfg.timeouts.attempt_ms = 1_000;
        let pipeline = ResiliencePipeline::new(&cfg, transport).unwrap();

        let execution = pipeline.execute_traced(get()).await;
        assert!(matches!(
            execution.result,
            Err(ResilienceError::Transport { source: TransportError::Timeout(_), .. })
        ));
        assert_eq!(execution.attempts[0].verdict, Verdict::Failure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
            ],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(0), transport).unwrap();
        for _ in 0..3 {
            let _ = pipeline.execute(get()).await;
        }
        assert!(pipeline.execute(get()).await.unwrap_err().is_fail_fast());

        tokio::time::advance(Duration::from_millis(10_001)).await;
        let probe = pipeline.execute(get()).await.unwrap();
        assert_eq!(probe.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(pipeline.execute(get()).await.unwrap_err().is_fail_fast());
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        tokio::time::advance(Duration::from_millis(10_001)).await;
        assert_eq!(pipeline.execute(get()).await.unwrap().status, StatusCode::OK);
        let breaker = pipeline.breakers().get(&get().breaker_key());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_records_nothing() {
        let transport = service_fn(|_req: RequestDescriptor| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TransportError>(UpstreamResponse::new(StatusCode::INTERNAL_SERVER_ERROR))
        });
        let pipeline = ResiliencePipeline::new(&config(0), transport).unwrap();

        let cancelled = tokio::time::timeout(Duration::from_secs(1), pipeline.execute(get())).await;
        assert!(cancelled.is_err());

        let breaker = pipeline.breakers().get(&get().breaker_key());
        assert_eq!(breaker.counts().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_resets_breakers_and_applies_thresholds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
            ],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(0), transport).unwrap();
        for _ in 0..3 {
            let _ = pipeline.execute(get()).await;
        }
        assert!(pipeline.execute(get()).await.unwrap_err().is_fail_fast());

        let mut relaxed = config(0);
        relaxed.breaker.minimum_request_threshold = 100;
        pipeline.reload(&relaxed).unwrap();
        assert!(pipeline.breakers().is_empty());
        assert_eq!(pipeline.execute(get()).await.unwrap().status, StatusCode::OK);

        let mut invalid = config(0);
        invalid.breaker.failure_rate_threshold = 2.0;
        assert!(pipeline.reload(&invalid).is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut cfg = config(1);
        cfg.retries.multiplier = 0.5;
        let transport = service_fn(|_req: RequestDescriptor| async {
            Ok::<_, TransportError>(UpstreamResponse::new(StatusCode::OK))
        });
        assert!(matches!(
            ResiliencePipeline::new(&cfg, transport),
            Err(ConfigError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_partitioned_by_host_and_method() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = scripted(
            vec![
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
                status(StatusCode::INTERNAL_SERVER_ERROR),
            ],
            calls.clone(),
        );
        let pipeline = ResiliencePipeline::new(&config(0), transport).unwrap();
        for _ in 0..3 {
            let _ = pipeline.execute(get()).await;
        }
        assert!(pipeline.execute(get()).await.unwrap_err().is_fail_fast());

        let other_host = RequestDescriptor::get("http://other.local/items".parse().unwrap());
        assert!(pipeline.execute(other_host).await.is_ok());
        let other_method = RequestDescriptor::new(Method::PUT, "http://api.local/items".parse().unwrap());
        assert!(pipeline.execute(other_method).await.is_ok());
        assert_eq!(pipeline.breakers().len(), 3);
    }
}
