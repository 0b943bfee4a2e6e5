//! Ordered predicate → action rules.
//!
//! Both the breaker accounting and the retry policy are expressed as an
//! ordered `Vec` of rules evaluated first-match-wins. A rule applies when the
//! request method is in its scope and at least one of its conditions matches
//! the attempt outcome.

use std::collections::HashSet;
use hyper::Method;

use crate::resilience::types::{AttemptOutcome, TransportError};

/// Which requests a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodScope {
    /// Requests classified as idempotent.
    Idempotent,
    /// Requests using one of the standard HTTP methods.
    Known,
    /// Every request.
    Any,
}

impl MethodScope {
    /// Whether `request` (method, idempotent) falls in this scope.
    ///
    /// Without a request only `Any` applies.
    pub fn contains(&self, request: Option<(&Method, bool)>) -> bool {
        match (self, request) {
            (MethodScope::Any, _) => true,
            (MethodScope::Idempotent, Some((_, idempotent))) => idempotent,
            (MethodScope::Known, Some((method, _))) => is_known_method(method),
            (_, None) => false,
        }
    }
}

/// Standard HTTP methods (extension methods excluded).
pub fn is_known_method(method: &Method) -> bool {
    [
        Method::OPTIONS,
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::TRACE,
        Method::CONNECT,
    ]
    .contains(method)
}

/// A condition over the outcome of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The breaker rejected the attempt.
    FailFast,
    /// The server provably never acted on the request.
    Unprocessed,
    /// Response with a 5xx status.
    ServerErrorStatus,
    /// Any transport-level error.
    Exception,
    /// Response carrying one of these in-band gRPC statuses.
    GrpcStatus(HashSet<i32>),
}

/// Facts about an outcome that conditions are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeFacts<'a> {
    pub outcome: &'a AttemptOutcome,
    /// Timeouts count as unprocessed when configured to.
    pub timeout_is_unprocessed: bool,
}

impl OutcomeFacts<'_> {
    pub fn is_unprocessed(&self) -> bool {
        match self.outcome {
            AttemptOutcome::Transport(TransportError::Timeout(_)) => self.timeout_is_unprocessed,
            AttemptOutcome::Transport(err) => err.is_unprocessed(),
            _ => false,
        }
    }
}

impl Condition {
    pub fn matches(&self, facts: &OutcomeFacts<'_>) -> bool {
        match (self, facts.outcome) {
            (Condition::FailFast, AttemptOutcome::FailFast(_)) => true,
            (Condition::Unprocessed, _) => facts.is_unprocessed(),
            (Condition::ServerErrorStatus, AttemptOutcome::Response(r)) => r.status.is_server_error(),
            (Condition::Exception, AttemptOutcome::Transport(_)) => true,
            (Condition::GrpcStatus(codes), AttemptOutcome::Response(r)) => {
                r.grpc_status().is_some_and(|code| codes.contains(&code))
            }
            _ => false,
        }
    }
}

/// A scoped rule: applies `action` when any condition matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<A> {
    pub scope: MethodScope,
    pub conditions: Vec<Condition>,
    pub action: A,
}

impl<A> Rule<A> {
    fn applies(&self, request: Option<(&Method, bool)>, facts: &OutcomeFacts<'_>) -> bool {
        self.scope.contains(request) && self.conditions.iter().any(|c| c.matches(facts))
    }
}

/// Evaluate `rules` in order and return the action of the first match.
pub fn first_match<A: Copy>(
    rules: &[Rule<A>],
    request: Option<(&Method, bool)>,
    facts: &OutcomeFacts<'_>,
) -> Option<A> {
    rules
        .iter()
        .find(|rule| rule.applies(request, facts))
        .map(|rule| rule.action)
}

/// Builder collecting conditions before the action is chosen.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    scope: MethodScope,
    conditions: Vec<Condition>,
}

impl RuleBuilder {
    pub fn new(scope: MethodScope) -> Self {
        Self {
            scope,
            conditions: Vec::new(),
        }
    }

    pub fn on_fail_fast(mut self) -> Self {
        self.conditions.push(Condition::FailFast);
        self
    }

    pub fn on_unprocessed(mut self) -> Self {
        self.conditions.push(Condition::Unprocessed);
        self
    }

    pub fn on_server_error_status(mut self) -> Self {
        self.conditions.push(Condition::ServerErrorStatus);
        self
    }

    pub fn on_exception(mut self) -> Self {
        self.conditions.push(Condition::Exception);
        self
    }

    pub fn on_grpc_status(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.conditions.push(Condition::GrpcStatus(codes.into_iter().collect()));
        self
    }

    pub fn then<A>(self, action: A) -> Rule<A> {
        Rule {
            scope: self.scope,
            conditions: self.conditions,
            action,
        }
    }
}
