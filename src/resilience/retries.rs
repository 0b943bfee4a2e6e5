//! Retry logic.
//!
//! # Responsibilities
//! - Decide per attempt whether the call is retried, and after which delay
//! - Enforce the global retry cap regardless of rule outcome
//!
//! # Rules (first match wins)
//! ```text
//! fail-fast (any method)                      → NoRetry
//! idempotent + (5xx | transport error)        → Backoff
//! known method + unprocessed                  → Backoff
//! (no match)                                  → NoRetry
//! ```
//!
//! # Design Decisions
//! - Fail-fast is checked first so an open breaker never triggers a retry storm
//! - Unprocessed requests are safe to repeat even for POST
//! - Partial failures (in-band gRPC status) are not retry conditions

use std::time::Duration;
use hyper::Method;

use crate::config::RetryConfig;
use crate::http::request::RequestDescriptor;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::rules::{first_match, MethodScope, OutcomeFacts, Rule, RuleBuilder};
use crate::resilience::types::AttemptOutcome;

/// What a matching retry rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    NoRetry,
    Backoff,
    Immediately,
}

pub type RetryRule = Rule<RetryAction>;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
    RetryImmediately,
}

/// Ordered retry rules plus backoff and the retry cap.
#[derive(Debug)]
pub struct RetryPolicy {
    rules: Vec<RetryRule>,
    backoff: BackoffPolicy,
    max_retries: u32,
    idempotent_methods: Vec<Method>,
    timeout_is_unprocessed: bool,
}

impl RetryPolicy {
    /// Build the default rule chain from configuration.
    pub fn from_config(config: &RetryConfig, timeout_is_unprocessed: bool) -> Self {
        Self::with_backoff(config, BackoffPolicy::from_config(config), timeout_is_unprocessed)
    }

    pub fn with_backoff(config: &RetryConfig, backoff: BackoffPolicy, timeout_is_unprocessed: bool) -> Self {
        let idempotent_methods = config
            .idempotent_methods
            .iter()
            .filter_map(|m| m.parse::<Method>().ok())
            .collect();

        Self {
            rules: default_rules(),
            backoff,
            max_retries: config.max_retries,
            idempotent_methods,
            timeout_is_unprocessed,
        }
    }

    /// Replace the rule chain.
    pub fn with_rules(mut self, rules: Vec<RetryRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether the request may be repeated on server errors.
    pub fn is_idempotent(&self, request: &RequestDescriptor) -> bool {
        request
            .idempotent
            .unwrap_or_else(|| self.idempotent_methods.contains(&request.method))
    }

    /// Decide what to do after attempt `attempt_index` (0-based) ended with `outcome`.
    pub fn decide(&self, request: &RequestDescriptor, attempt_index: u32, outcome: &AttemptOutcome) -> RetryDecision {
        let facts = OutcomeFacts {
            outcome,
            timeout_is_unprocessed: self.timeout_is_unprocessed,
        };
        let action = first_match(
            &self.rules,
            Some((&request.method, self.is_idempotent(request))),
            &facts,
        )
        .unwrap_or(RetryAction::NoRetry);

        if action == RetryAction::NoRetry || attempt_index >= self.max_retries {
            return RetryDecision::NoRetry;
        }

        match action {
            RetryAction::Backoff => RetryDecision::RetryAfter(self.backoff.next_delay(attempt_index)),
            RetryAction::Immediately => RetryDecision::RetryImmediately,
            RetryAction::NoRetry => RetryDecision::NoRetry,
        }
    }
}

/// The layered default policy.
pub fn default_rules() -> Vec<RetryRule> {
    vec![
        RuleBuilder::new(MethodScope::Any)
            .on_fail_fast()
            .then(RetryAction::NoRetry),
        RuleBuilder::new(MethodScope::Idempotent)
            .on_server_error_status()
            .on_exception()
            .then(RetryAction::Backoff),
        RuleBuilder::new(MethodScope::Known)
            .on_unprocessed()
            .then(RetryAction::Backoff),
    ]
}
