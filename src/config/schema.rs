//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the resilient client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Circuit breaker thresholds (applied per host and method).
    pub breaker: BreakerConfig,

    /// Retry rules and backoff.
    pub retries: RetryConfig,

    /// Outcome classification settings.
    pub classifier: ClassifierConfig,

    /// Transport deadlines.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Prefix of every breaker name (`<prefix>::<host>::<method>`).
    pub name_prefix: String,

    /// Requests counted in the window before the failure rate is evaluated.
    pub minimum_request_threshold: u64,

    /// Failure rate (0.0..=1.0) at which the breaker opens.
    pub failure_rate_threshold: f64,

    /// How long the breaker stays open before admitting probes.
    pub open_cooldown_ms: u64,

    /// Probes admitted while half-open; this many successes close the breaker.
    pub half_open_probes: u32,

    /// Interval after which a new probe is admitted if the previous ones never reported.
    pub trial_interval_ms: u64,

    /// Length of the sliding window over which outcomes are counted.
    pub counter_window_ms: u64,

    /// Width of a single bucket in the sliding window.
    pub counter_bucket_ms: u64,
}

impl BreakerConfig {
    pub fn open_cooldown(&self) -> Duration {
        Duration::from_millis(self.open_cooldown_ms)
    }

    pub fn trial_interval(&self) -> Duration {
        Duration::from_millis(self.trial_interval_ms)
    }

    pub fn counter_window(&self) -> Duration {
        Duration::from_millis(self.counter_window_ms)
    }

    pub fn counter_bucket(&self) -> Duration {
        Duration::from_millis(self.counter_bucket_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name_prefix: "resilient-client".to_string(),
            minimum_request_threshold: 3,
            failure_rate_threshold: 0.5,
            open_cooldown_ms: 10_000,
            half_open_probes: 1,
            trial_interval_ms: 3_000,
            counter_window_ms: 20_000,
            counter_bucket_ms: 1_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds (before jitter).
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Jitter fraction, e.g. 0.1 perturbs every delay by up to ±10%.
    pub jitter: f64,

    /// Methods considered safe to repeat on server errors.
    pub idempotent_methods: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 100,
            max_delay_ms: 100,
            multiplier: 2.0,
            jitter: 0.1,
            idempotent_methods: ["GET", "HEAD", "PUT", "DELETE", "OPTIONS", "TRACE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Outcome classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// gRPC status codes that count as a failure even on a successful exchange.
    pub partial_failure_grpc_codes: Vec<i32>,

    /// Treat attempt timeouts as "server never processed the request".
    pub timeout_is_unprocessed: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            // UNIMPLEMENTED, DEADLINE_EXCEEDED, RESOURCE_EXHAUSTED, FAILED_PRECONDITION,
            // UNAVAILABLE, ABORTED, INTERNAL
            partial_failure_grpc_codes: vec![12, 4, 8, 9, 14, 10, 13],
            timeout_is_unprocessed: false,
        }
    }
}

/// Timeout configuration for transport operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Deadline of a single attempt in milliseconds (0 disables it).
    pub attempt_ms: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn attempt(&self) -> Option<Duration> {
        (self.attempt_ms > 0).then(|| Duration::from_millis(self.attempt_ms))
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            attempt_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [breaker]
            minimum_request_threshold = 10

            [retries]
            max_retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.minimum_request_threshold, 10);
        assert_eq!(config.breaker.failure_rate_threshold, 0.5);
        assert_eq!(config.retries.max_retries, 3);
        assert_eq!(config.retries.base_delay_ms, 100);
        assert_eq!(config.classifier.partial_failure_grpc_codes.len(), 7);
    }

    #[test]
    fn test_attempt_timeout_can_be_disabled() {
        let timeouts = TimeoutConfig { connect_ms: 100, attempt_ms: 0 };
        assert_eq!(timeouts.attempt(), None);
        assert_eq!(TimeoutConfig::default().attempt(), Some(Duration::from_secs(10)));
    }
}
