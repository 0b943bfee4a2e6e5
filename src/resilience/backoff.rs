//! Exponential backoff with jitter.

use std::sync::Mutex;
use std::time::Duration;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::config::RetryConfig;

/// Computes the delay before a retry.
///
/// `delay(n) = min(base * multiplier^n, max) * (1 ± jitter)`
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl std::fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffPolicy")
            .field("base", &self.base)
            .field("max", &self.max)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self::with_rng(base, max, multiplier, jitter, StdRng::from_entropy())
    }

    /// Use an explicit random source, e.g. a seeded `StdRng` in tests.
    pub fn with_rng(
        base: Duration,
        max: Duration,
        multiplier: f64,
        jitter: f64,
        rng: impl RngCore + Send + 'static,
    ) -> Self {
        Self {
            base,
            max,
            multiplier,
            jitter,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.multiplier,
            config.jitter,
        )
    }

    /// Delay before the retry following attempt `attempt_index` (0-based).
    pub fn next_delay(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let exponential_ms = self.base.as_secs_f64() * 1000.0 * self.multiplier.powi(exponent);
        let capped_ms = exponential_ms.min(self.max.as_secs_f64() * 1000.0);

        let factor = if self.jitter > 0.0 {
            let mut rng = self.rng.lock().expect("backoff rng mutex poisoned");
            1.0 + rng.gen_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };

        Duration::from_secs_f64((capped_ms * factor).max(0.0) / 1000.0)
    }
}
