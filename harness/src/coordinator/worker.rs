//! Worker loop
//!
//! A worker adopts the leader's encoded state, then runs its tests one at a
//! time. Each test gets a fresh correlation context and resource scope; the
//! body runs in its own task so a panic is observed rather than unwinding
//! through the worker. Failures are dispatched to the hook registry while the
//! test's resources still exist, and the scope is always drained afterwards.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use shared::{NodeId, correlated_error, correlated_info, correlated_warn};

use super::report::{TestOutcome, TestVerdict, WorkerReport};
use crate::codec::{SharedStateCodec, SharedSuiteState};
use crate::hooks::{DiagnosticContext, FailureHookRegistry, FailureRecord};
use crate::lifecycle::{ResourceLifecycleManager, ResourceScope, TrackedResource};
use crate::platform::PlatformClient;
use crate::tracer::{CorrelationContext, CorrelationTracer};

type TestBody = dyn Fn(TestContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A named test body
#[derive(Clone)]
pub struct TestCase {
    name: String,
    body: Arc<TestBody>,
}

impl TestCase {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// What a test body gets to work with
#[derive(Clone)]
pub struct TestContext {
    pub state: Arc<SharedSuiteState>,
    /// Everything created through this is removed when the test ends
    pub resources: ResourceScope,
    pub platform: Arc<dyn PlatformClient>,
    pub worker: NodeId,
}

impl TestContext {
    pub fn correlation(&self) -> &CorrelationContext {
        self.resources.correlation()
    }

    /// The suite-shared space, the usual parent for test resources
    pub fn shared_space(&self) -> anyhow::Result<&TrackedResource> {
        self.state
            .shared_space()
            .ok_or_else(|| anyhow::anyhow!("suite state has no shared space"))
    }
}

#[derive(Clone)]
pub(crate) struct Worker {
    pub(crate) node: NodeId,
    pub(crate) lifecycle: ResourceLifecycleManager,
    pub(crate) tracer: CorrelationTracer,
    pub(crate) hooks: Arc<FailureHookRegistry>,
}

impl Worker {
    /// Adopt the encoded state and run every test in order
    pub(crate) async fn run(self, encoded_state: Arc<Vec<u8>>, tests: Vec<TestCase>) -> WorkerReport {
        let state = match SharedStateCodec::decode(&encoded_state) {
            Ok(state) => Arc::new(state),
            Err(e) => {
                tracing::error!(worker = %self.node, "❌ Failed to adopt suite state: {}", e);
                return WorkerReport::failed(self.node, format!("failed to adopt suite state: {e}"));
            }
        };

        tracing::info!(worker = %self.node, "👷 Worker starting {} tests", tests.len());
        let mut report = WorkerReport::new(self.node);
        for test in &tests {
            report.outcomes.push(self.run_test(test, &state).await);
        }
        report
    }

    async fn run_test(&self, test: &TestCase, state: &Arc<SharedSuiteState>) -> TestOutcome {
        let correlation = self.tracer.new_context();
        let scope = self.lifecycle.scope(correlation);
        let context = TestContext {
            state: state.clone(),
            resources: scope.clone(),
            platform: self.lifecycle.platform().clone(),
            worker: self.node,
        };

        correlated_info!(correlation, worker = %self.node, "▶️ Running '{}'", test.name);
        let body = (test.body)(context);
        let mut verdict = match tokio::spawn(body).await {
            Ok(Ok(())) => TestVerdict::Passed,
            Ok(Err(e)) => TestVerdict::Failed(format!("{e:#}")),
            Err(join_error) if join_error.is_panic() => {
                TestVerdict::Panicked(panic_message(join_error.into_panic()))
            }
            Err(join_error) => TestVerdict::Failed(join_error.to_string()),
        };

        let resources = scope.resources();
        let diagnostics = match verdict.failure_message() {
            Some(message) => {
                correlated_error!(correlation, worker = %self.node, "❌ '{}' failed: {}", test.name, message);
                let record = FailureRecord {
                    test: test.name.clone(),
                    message: message.to_string(),
                    correlation,
                    resources: resources.clone(),
                    connection: state.connection.clone(),
                };
                let diagnostics = DiagnosticContext::new(self.lifecycle.platform().clone());
                Some(self.hooks.dispatch(record, &diagnostics).await)
            }
            None => None,
        };

        let cleanup = scope.cleanup().await;
        let cleanup_failures: Vec<(TrackedResource, String)> = cleanup
            .failures
            .into_iter()
            .map(|(resource, error)| (resource, error.to_string()))
            .collect();

        if !cleanup_failures.is_empty() {
            let names: Vec<String> = cleanup_failures.iter().map(|(r, _)| r.to_string()).collect();
            correlated_warn!(
                correlation,
                worker = %self.node,
                "🧹 '{}' left resources behind: {}",
                test.name,
                names.join(", ")
            );
            if verdict.is_pass() {
                verdict = TestVerdict::Failed(format!("cleanup failed for {}", names.join(", ")));
            }
        }

        if verdict.is_pass() {
            correlated_info!(correlation, worker = %self.node, "✅ '{}' passed", test.name);
        }

        TestOutcome {
            name: test.name.clone(),
            worker: self.node,
            correlation_id: correlation.id(),
            verdict,
            resources,
            cleanup_failures,
            diagnostics,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
