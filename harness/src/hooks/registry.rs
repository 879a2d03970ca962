//! Failure hook registry and dispatch

use std::sync::Arc;
use std::time::Duration;

use shared::{CorrelationId, correlated_debug, correlated_info, correlated_warn};
use tokio::time::timeout;

use super::{DiagnosticContext, DiagnosticHandler, FailureRecord, Matcher};
use crate::error::HarnessError;

/// How many matching entries run for one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Every matching handler runs, in registration order
    #[default]
    AllMatches,
    /// Only the first matching handler runs
    FirstMatch,
}

pub struct HookEntry {
    pub matcher: Matcher,
    pub handler: Arc<dyn DiagnosticHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed,
    Failed(String),
    /// Aborted after exceeding the diagnostic timeout
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub correlation_id: CorrelationId,
    pub test: String,
    /// Handler name and outcome, in invocation order
    pub outcomes: Vec<(String, HandlerOutcome)>,
}

impl DispatchReport {
    pub fn matched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn handlers(&self) -> Vec<&str> {
        self.outcomes.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// True when every invoked handler ran to completion
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == HandlerOutcome::Completed)
    }
}

pub struct FailureHookRegistry {
    entries: Vec<HookEntry>,
    policy: DispatchPolicy,
    handler_timeout: Duration,
}

impl FailureHookRegistry {
    pub fn new(handler_timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            policy: DispatchPolicy::default(),
            handler_timeout,
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Append an entry; entries are evaluated in registration order
    pub fn register<H>(&mut self, matcher: Matcher, handler: H) -> &mut Self
    where
        H: DiagnosticHandler + 'static,
    {
        self.register_shared(matcher, Arc::new(handler))
    }

    pub fn register_shared(&mut self, matcher: Matcher, handler: Arc<dyn DiagnosticHandler>) -> &mut Self {
        tracing::debug!(
            "🪝 Registered diagnostic hook '{}' ({})",
            handler.name(),
            matcher.description()
        );
        self.entries.push(HookEntry { matcher, handler });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose matcher accepts the content, honouring the policy
    pub fn matching(&self, content: &str) -> Vec<&HookEntry> {
        let matches = self.entries.iter().filter(|entry| entry.matcher.matches(content));
        match self.policy {
            DispatchPolicy::AllMatches => matches.collect(),
            DispatchPolicy::FirstMatch => matches.take(1).collect(),
        }
    }

    /// Run every matching handler for a failure
    ///
    /// Handler errors, panics and timeouts are logged and reported, never
    /// propagated.
    pub async fn dispatch(&self, failure: FailureRecord, context: &DiagnosticContext) -> DispatchReport {
        let failure = Arc::new(failure);
        let mut report = DispatchReport {
            correlation_id: failure.correlation.id(),
            test: failure.test.clone(),
            outcomes: Vec::new(),
        };

        let matching = self.matching(&failure.message);
        if matching.is_empty() {
            correlated_debug!(failure.correlation, "No diagnostic hooks matched failure of '{}'", failure.test);
            return report;
        }

        for entry in matching {
            let name = entry.handler.name().to_string();
            correlated_info!(
                failure.correlation,
                handler = %name,
                "🩺 Collecting diagnostics for '{}' ({})",
                failure.test,
                entry.matcher.description()
            );

            let handler = entry.handler.clone();
            let record = failure.clone();
            let ctx = context.clone();
            let mut task = tokio::spawn(async move { handler.collect(&record, &ctx).await });

            let outcome = match timeout(self.handler_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => HandlerOutcome::Completed,
                Ok(Ok(Err(e))) => HandlerOutcome::Failed(format!("{e:#}")),
                Ok(Err(join_error)) => HandlerOutcome::Failed(format!("handler panicked: {join_error}")),
                Err(_) => {
                    task.abort();
                    HandlerOutcome::TimedOut
                }
            };

            match &outcome {
                HandlerOutcome::Completed => {}
                HandlerOutcome::Failed(message) => {
                    let error = HarnessError::DiagnosticHandler {
                        handler: name.clone(),
                        message: message.clone(),
                    };
                    correlated_warn!(failure.correlation, handler = %name, "⚠️ {}", error);
                }
                HandlerOutcome::TimedOut => {
                    correlated_warn!(
                        failure.correlation,
                        handler = %name,
                        "⏰ Diagnostics incomplete: handler '{}' exceeded {:?}",
                        name,
                        self.handler_timeout
                    );
                }
            }

            report.outcomes.push((name, outcome));
        }

        report
    }
}
