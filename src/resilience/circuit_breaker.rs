//! Circuit breaker for destination protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: destination assumed down, requests fail fast
//! - Half-Open: testing if destination recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: counted >= minimum_request_threshold && failure rate >= threshold
//! Open → Half-Open: after open cooldown (checked on admit)
//! Half-Open → Closed: half_open_probes successful probes
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - Per host and method breaker (not global), created lazily by the registry
//! - Fail fast in Open state (no waiting for timeout)
//! - Counters live in a time-bucketed sliding window so old history expires
//! - Ignored verdicts touch nothing
//! - One mutex per breaker; admit and record are separate critical sections

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::types::{BreakerKey, Verdict};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Whether an attempt may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    FailFast,
}

/// Success/failure totals over the sliding window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCount {
    pub success: u64,
    pub failure: u64,
}

impl EventCount {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.failure as f64 / self.total() as f64
        }
    }
}

#[derive(Debug)]
struct Bucket {
    start: Instant,
    count: EventCount,
}

/// Time-bucketed sliding window counter.
#[derive(Debug)]
struct RollingCounter {
    window: Duration,
    bucket_width: Duration,
    buckets: VecDeque<Bucket>,
}

impl RollingCounter {
    fn new(window: Duration, bucket_width: Duration) -> Self {
        Self {
            window,
            bucket_width,
            buckets: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.start) >= self.window {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn add(&mut self, now: Instant, verdict: Verdict) {
        self.evict(now);
        let needs_bucket = match self.buckets.back() {
            Some(last) => now.saturating_duration_since(last.start) >= self.bucket_width,
            None => true,
        };
        if needs_bucket {
            self.buckets.push_back(Bucket {
                start: now,
                count: EventCount::default(),
            });
        }
        if let Some(bucket) = self.buckets.back_mut() {
            match verdict {
                Verdict::Success => bucket.count.success += 1,
                Verdict::Failure => bucket.count.failure += 1,
                Verdict::Ignored => {}
            }
        }
    }

    fn snapshot(&mut self, now: Instant) -> EventCount {
        self.evict(now);
        self.buckets.iter().fold(EventCount::default(), |acc, b| EventCount {
            success: acc.success + b.count.success,
            failure: acc.failure + b.count.failure,
        })
    }

    fn reset(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    counter: RollingCounter,
    open_until: Option<Instant>,
    probes_admitted: u32,
    probe_successes: u32,
    last_probe_at: Option<Instant>,
}

/// Circuit breaker for a single breaker key.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: Arc<BreakerConfig>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: Arc<BreakerConfig>) -> Self {
        let counter = RollingCounter::new(config.counter_window(), config.counter_bucket());
        let breaker = Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                counter,
                open_until: None,
                probes_admitted: 0,
                probe_successes: 0,
                last_probe_at: None,
            }),
        };
        metrics::record_breaker_state(&breaker.name, BreakerState::Closed);
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decide whether a new attempt may proceed.
    pub fn admit(&self) -> Admission {
        self.admit_at(Instant::now())
    }

    /// Record the verdict of a completed attempt.
    pub fn record(&self, verdict: Verdict) {
        self.record_at(Instant::now(), verdict)
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Counters over the current window.
    pub fn counts(&self) -> EventCount {
        self.counts_at(Instant::now())
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let mut inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            counts: inner.counter.snapshot(now),
            open_for: inner.open_until.map(|until| until.saturating_duration_since(now)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    pub(crate) fn counts_at(&self, now: Instant) -> EventCount {
        self.lock().counter.snapshot(now)
    }

    pub(crate) fn admit_at(&self, now: Instant) -> Admission {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                let expired = inner.open_until.map_or(true, |until| now >= until);
                if !expired {
                    return Admission::FailFast;
                }
                self.transition(&mut inner, BreakerState::HalfOpen, now);
                self.admit_probe(&mut inner, now)
            }
            BreakerState::HalfOpen => self.admit_probe(&mut inner, now),
        }
    }

    fn admit_probe(&self, inner: &mut Inner, now: Instant) -> Admission {
        if inner.probes_admitted < self.config.half_open_probes {
            inner.probes_admitted += 1;
            inner.last_probe_at = Some(now);
            return Admission::Allowed;
        }

        // Probes that never reported (cancelled, ignored) must not wedge the breaker.
        let stale = inner
            .last_probe_at
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.trial_interval());
        if stale {
            tracing::debug!(breaker = %self.name, "Admitting new trial request after trial interval");
            inner.probes_admitted = 1;
            inner.last_probe_at = Some(now);
            Admission::Allowed
        } else {
            Admission::FailFast
        }
    }

    pub(crate) fn record_at(&self, now: Instant, verdict: Verdict) {
        if verdict == Verdict::Ignored {
            return;
        }

        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.counter.add(now, verdict);
                let count = inner.counter.snapshot(now);
                if count.total() >= self.config.minimum_request_threshold
                    && count.failure_rate() >= self.config.failure_rate_threshold
                {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = count.failure,
                        total = count.total(),
                        failure_rate = count.failure_rate(),
                        "Failure rate threshold exceeded"
                    );
                    self.transition(&mut inner, BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => match verdict {
                Verdict::Failure => self.transition(&mut inner, BreakerState::Open, now),
                Verdict::Success => {
                    inner.probe_successes += 1;
                    if inner.probe_successes >= self.config.half_open_probes {
                        self.transition(&mut inner, BreakerState::Closed, now);
                    }
                }
                Verdict::Ignored => {}
            },
            // Late results of attempts admitted before the breaker opened.
            BreakerState::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.probes_admitted = 0;
        inner.probe_successes = 0;
        inner.last_probe_at = None;
        match to {
            BreakerState::Open => {
                inner.open_until = Some(now + self.config.open_cooldown());
                inner.counter.reset();
            }
            BreakerState::HalfOpen => {
                inner.open_until = None;
            }
            BreakerState::Closed => {
                inner.open_until = None;
                inner.counter.reset();
            }
        }

        match to {
            BreakerState::Open => tracing::warn!(
                breaker = %self.name,
                from = from.as_str(),
                cooldown = ?self.config.open_cooldown(),
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                breaker = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state changed"
            ),
        }
        metrics::record_breaker_transition(&self.name, to);
    }
}

/// Point-in-time view of a breaker, used for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub counts: EventCount,
    pub open_for: Option<Duration>,
}

/// Lazily created breakers, one per key.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<BreakerKey, Arc<CircuitBreaker>>,
    config: ArcSwap<BreakerConfig>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Breaker for `key`, created on first use.
    pub fn get(&self, key: &BreakerKey) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(key) {
            return breaker.clone();
        }
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                let config = self.config.load_full();
                let name = format!("{}::{}::{}", config.name_prefix, key.host, key.method);
                tracing::debug!(breaker = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Apply new thresholds. Existing breaker state is discarded.
    pub fn reconfigure(&self, config: BreakerConfig) {
        self.config.store(Arc::new(config));
        let dropped = self.breakers.len();
        self.breakers.clear();
        tracing::info!(dropped, "Circuit breakers reset for new configuration");
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|entry| entry.value().snapshot()).collect()
    }
}
