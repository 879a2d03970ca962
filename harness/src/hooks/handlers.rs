//! Diagnostic handlers

use shared::{DiagnosticLog, correlated_info, correlated_warn};

use super::{DiagnosticContext, FailureRecord};

/// Side-effecting diagnostic routine run for a matching failure
///
/// Errors are logged by the registry and never escalate.
#[async_trait::async_trait]
pub trait DiagnosticHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, failure: &FailureRecord, context: &DiagnosticContext) -> anyhow::Result<()>;
}

/// Handler backed by a synchronous closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&FailureRecord) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait::async_trait]
impl<F> DiagnosticHandler for FnHandler<F>
where
    F: Fn(&FailureRecord) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, failure: &FailureRecord, _context: &DiagnosticContext) -> anyhow::Result<()> {
        (self.f)(failure)
    }
}

/// Logs the live platform state of every resource the failed test held
pub struct ResourceSnapshotHandler;

#[async_trait::async_trait]
impl DiagnosticHandler for ResourceSnapshotHandler {
    fn name(&self) -> &str {
        "resource-snapshot"
    }

    async fn collect(&self, failure: &FailureRecord, context: &DiagnosticContext) -> anyhow::Result<()> {
        let mut unreadable = 0;

        for resource in &failure.resources {
            match context
                .platform
                .get(&resource.reference(), &failure.correlation)
                .await
            {
                Ok(remote) => {
                    correlated_info!(
                        failure.correlation,
                        resource_id = %resource.id,
                        test = %failure.test,
                        "🔎 {} is in state '{}'",
                        resource,
                        remote.state
                    );
                }
                Err(e) => {
                    unreadable += 1;
                    correlated_warn!(
                        failure.correlation,
                        resource_id = %resource.id,
                        test = %failure.test,
                        "🔎 {} could not be read: {}",
                        resource,
                        e
                    );
                }
            }
        }

        if unreadable > 0 {
            anyhow::bail!("{unreadable} of {} resources could not be read", failure.resources.len());
        }
        Ok(())
    }
}

/// Replays everything the diagnostic log captured for the failed test
pub struct CorrelationReplayHandler {
    log: DiagnosticLog,
}

impl CorrelationReplayHandler {
    pub fn new(log: DiagnosticLog) -> Self {
        Self { log }
    }
}

#[async_trait::async_trait]
impl DiagnosticHandler for CorrelationReplayHandler {
    fn name(&self) -> &str {
        "correlation-replay"
    }

    async fn collect(&self, failure: &FailureRecord, _context: &DiagnosticContext) -> anyhow::Result<()> {
        let events = self.log.for_correlation(&failure.correlation.to_string());

        // Plain events: anything carrying the correlation id would be captured again
        tracing::info!(
            test = %failure.test,
            "📜 {} events recorded for correlation {}",
            events.len(),
            failure.correlation
        );
        for event in events {
            tracing::info!(
                test = %failure.test,
                "📜 {} {:>5} {}: {}",
                event.timestamp.format("%H:%M:%S%.3f"),
                event.level,
                event.target,
                event.message
            );
        }
        Ok(())
    }
}
