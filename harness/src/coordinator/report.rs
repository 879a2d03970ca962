//! Run outcome reporting

use std::fmt;

use shared::{CorrelationId, NodeId, RunId};

use crate::hooks::DispatchReport;
use crate::lifecycle::TrackedResource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestVerdict {
    Passed,
    Failed(String),
    Panicked(String),
}

impl TestVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, TestVerdict::Passed)
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            TestVerdict::Passed => None,
            TestVerdict::Failed(message) | TestVerdict::Panicked(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub name: String,
    pub worker: NodeId,
    pub correlation_id: CorrelationId,
    pub verdict: TestVerdict,
    /// Resources the test held when its body finished
    pub resources: Vec<TrackedResource>,
    /// Resources whose cleanup failed, with the reason
    pub cleanup_failures: Vec<(TrackedResource, String)>,
    pub diagnostics: Option<DispatchReport>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker: NodeId,
    pub outcomes: Vec<TestOutcome>,
    /// Worker-level failure: state not adopted, task panicked, no completion marker
    pub error: Option<String>,
}

impl WorkerReport {
    pub fn new(worker: NodeId) -> Self {
        Self {
            worker,
            outcomes: Vec::new(),
            error: None,
        }
    }

    pub fn failed(worker: NodeId, error: impl Into<String>) -> Self {
        Self {
            worker,
            outcomes: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none() && self.outcomes.iter().all(TestOutcome::passed)
    }
}

/// Best-effort teardown problem; never changes the run verdict
#[derive(Debug, Clone)]
pub struct TeardownFailure {
    pub resource: Option<TrackedResource>,
    pub message: String,
    pub correlation_id: CorrelationId,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{resource}: {} [{}]", self.message, self.correlation_id),
            None => write!(f, "{} [{}]", self.message, self.correlation_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub setup_error: Option<String>,
    pub workers: Vec<WorkerReport>,
    pub teardown_failures: Vec<TeardownFailure>,
}

impl RunReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            setup_error: None,
            workers: Vec::new(),
            teardown_failures: Vec::new(),
        }
    }

    pub fn aborted(run_id: RunId, setup_error: impl Into<String>) -> Self {
        Self {
            setup_error: Some(setup_error.into()),
            ..Self::new(run_id)
        }
    }

    /// Pass/fail from setup and test outcomes alone
    pub fn passed(&self) -> bool {
        self.setup_error.is_none() && self.workers.iter().all(WorkerReport::passed)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &TestOutcome> {
        self.workers.iter().flat_map(|w| w.outcomes.iter())
    }

    pub fn outcome(&self, name: &str) -> Option<&TestOutcome> {
        self.outcomes().find(|o| o.name == name)
    }

    pub fn failed_tests(&self) -> Vec<&TestOutcome> {
        self.outcomes().filter(|o| !o.passed()).collect()
    }

    /// Resources left on the platform by test cleanup or teardown
    pub fn leaked_resources(&self) -> Vec<&TrackedResource> {
        self.outcomes()
            .flat_map(|o| o.cleanup_failures.iter().map(|(r, _)| r))
            .chain(self.teardown_failures.iter().filter_map(|f| f.resource.as_ref()))
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.outcomes().count();
        let failed = self.failed_tests().len();
        let verdict = if self.passed() { "PASSED" } else { "FAILED" };
        write!(
            f,
            "run {} {}: {} tests, {} failed, {} teardown failures",
            self.run_id.short(),
            verdict,
            total,
            failed,
            self.teardown_failures.len()
        )?;
        if let Some(error) = &self.setup_error {
            write!(f, " (setup: {error})")?;
        }
        Ok(())
    }
}
