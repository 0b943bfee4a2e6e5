//! Outcome classification for circuit breaker accounting.
//!
//! # Rules (first match wins)
//! ```text
//! unprocessed / fail-fast          → Ignored
//! 5xx status                       → Failure
//! partial-failure grpc-status      → Failure
//! any other transport error        → Failure
//! (no match)                       → Success
//! ```
//!
//! # Design Decisions
//! - Pure function of the attempt outcome; the transport aggregates body and
//!   trailers before the verdict is computed
//! - Requests the server never processed do not count against it
//! - The partial-failure set only affects breaker accounting, never retries

use std::collections::HashSet;
use crate::config::ClassifierConfig;
use crate::http::response::UpstreamResponse;
use crate::resilience::rules::{first_match, MethodScope, OutcomeFacts, Rule, RuleBuilder};
use crate::resilience::types::{AttemptOutcome, ResilienceError, Verdict};

/// What a matching breaker rule does with the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerAction {
    CountFailure,
    Ignore,
}

pub type CircuitBreakerRule = Rule<BreakerAction>;

/// Maps attempt outcomes to breaker verdicts.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    rules: Vec<CircuitBreakerRule>,
    partial_failure_codes: HashSet<i32>,
    timeout_is_unprocessed: bool,
}

impl OutcomeClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let partial_failure_codes: HashSet<i32> =
            config.partial_failure_grpc_codes.iter().copied().collect();

        let rules = vec![
            RuleBuilder::new(MethodScope::Any)
                .on_unprocessed()
                .on_fail_fast()
                .then(BreakerAction::Ignore),
            RuleBuilder::new(MethodScope::Any)
                .on_server_error_status()
                .then(BreakerAction::CountFailure),
            RuleBuilder::new(MethodScope::Any)
                .on_grpc_status(partial_failure_codes.iter().copied())
                .then(BreakerAction::CountFailure),
            RuleBuilder::new(MethodScope::Any)
                .on_exception()
                .then(BreakerAction::CountFailure),
        ];

        Self::with_rules(rules, partial_failure_codes, config.timeout_is_unprocessed)
    }

    /// Build a classifier from a custom ordered rule chain.
    pub fn with_rules(
        rules: Vec<CircuitBreakerRule>,
        partial_failure_codes: HashSet<i32>,
        timeout_is_unprocessed: bool,
    ) -> Self {
        Self {
            rules,
            partial_failure_codes,
            timeout_is_unprocessed,
        }
    }

    pub fn timeout_is_unprocessed(&self) -> bool {
        self.timeout_is_unprocessed
    }

    /// Classify one attempt outcome.
    pub fn classify(&self, outcome: &AttemptOutcome) -> Verdict {
        let facts = OutcomeFacts {
            outcome,
            timeout_is_unprocessed: self.timeout_is_unprocessed,
        };
        // Breaker rules see no request, so only MethodScope::Any rules apply.
        match first_match(&self.rules, None, &facts) {
            Some(BreakerAction::Ignore) => Verdict::Ignored,
            Some(BreakerAction::CountFailure) => Verdict::Failure,
            None => Verdict::Success,
        }
    }

    /// The response-level failure reason, if the response counts as a failure.
    pub fn failure_of(&self, response: &UpstreamResponse) -> Option<ResilienceError> {
        if response.status.is_server_error() {
            return Some(ResilienceError::ServerError { status: response.status });
        }
        response
            .grpc_status()
            .filter(|code| self.partial_failure_codes.contains(code))
            .map(|grpc_status| ResilienceError::PartialFailure { grpc_status })
    }
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
