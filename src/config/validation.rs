//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds in range, windows > 0)
//! - Check that method names and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use hyper::Method;
use thiserror::Error;
use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("breaker.minimum_request_threshold must be at least 1")]
    ZeroRequestThreshold,

    #[error("breaker.failure_rate_threshold must be in (0, 1], got {0}")]
    FailureRateOutOfRange(f64),

    #[error("breaker.half_open_probes must be at least 1")]
    ZeroHalfOpenProbes,

    #[error("breaker.{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("breaker.counter_bucket_ms ({bucket}) exceeds counter_window_ms ({window})")]
    BucketLargerThanWindow { bucket: u64, window: u64 },

    #[error("retries.multiplier must be >= 1.0, got {0}")]
    MultiplierTooSmall(f64),

    #[error("retries.jitter must be in [0, 1], got {0}")]
    JitterOutOfRange(f64),

    #[error("retries.max_delay_ms ({max}) is below base_delay_ms ({base})")]
    MaxDelayBelowBase { base: u64, max: u64 },

    #[error("retries.idempotent_methods contains invalid method '{0}'")]
    InvalidMethod(String),

    #[error("timeouts.connect_ms must be greater than zero")]
    ZeroConnectTimeout,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let breaker = &config.breaker;
    if breaker.minimum_request_threshold == 0 {
        errors.push(ValidationError::ZeroRequestThreshold);
    }
    let rate = breaker.failure_rate_threshold;
    if rate.is_nan() || rate <= 0.0 || rate > 1.0 {
        errors.push(ValidationError::FailureRateOutOfRange(rate));
    }
    if breaker.half_open_probes == 0 {
        errors.push(ValidationError::ZeroHalfOpenProbes);
    }
    for (name, value) in [
        ("open_cooldown_ms", breaker.open_cooldown_ms),
        ("trial_interval_ms", breaker.trial_interval_ms),
        ("counter_window_ms", breaker.counter_window_ms),
        ("counter_bucket_ms", breaker.counter_bucket_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(name));
        }
    }
    if breaker.counter_bucket_ms > breaker.counter_window_ms {
        errors.push(ValidationError::BucketLargerThanWindow {
            bucket: breaker.counter_bucket_ms,
            window: breaker.counter_window_ms,
        });
    }

    let retries = &config.retries;
    if retries.multiplier.is_nan() || retries.multiplier < 1.0 {
        errors.push(ValidationError::MultiplierTooSmall(retries.multiplier));
    }
    if !(0.0..=1.0).contains(&retries.jitter) {
        errors.push(ValidationError::JitterOutOfRange(retries.jitter));
    }
    if retries.max_delay_ms < retries.base_delay_ms {
        errors.push(ValidationError::MaxDelayBelowBase {
            base: retries.base_delay_ms,
            max: retries.max_delay_ms,
        });
    }
    for method in &retries.idempotent_methods {
        if method.parse::<Method>().is_err() {
            errors.push(ValidationError::InvalidMethod(method.clone()));
        }
    }

    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ClientConfig::default();
        config.breaker.minimum_request_threshold = 0;
        config.breaker.failure_rate_threshold = 1.5;
        config.retries.jitter = -0.2;
        config.retries.idempotent_methods.push("NOT A METHOD".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroRequestThreshold));
        assert!(errors.contains(&ValidationError::FailureRateOutOfRange(1.5)));
        assert!(errors.contains(&ValidationError::JitterOutOfRange(-0.2)));
        assert!(errors.contains(&ValidationError::InvalidMethod("NOT A METHOD".into())));
    }

    #[test]
    fn test_window_and_delay_ordering() {
        let mut config = ClientConfig::default();
        config.breaker.counter_bucket_ms = 30_000;
        config.retries.base_delay_ms = 500;
        config.retries.max_delay_ms = 100;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::BucketLargerThanWindow {
            bucket: 30_000,
            window: 20_000
        }));
        assert!(errors.contains(&ValidationError::MaxDelayBelowBase { base: 500, max: 100 }));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ClientConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidMetricsAddress("nowhere".into())]);
    }
}
