//! In-memory platform
//!
//! Enforces the same rules a live platform would: parents must exist,
//! resources with live children cannot be deleted, and deletions can run as
//! jobs that complete only after being polled. Failures can be injected per
//! operation and target, and every call is journaled with its correlation id.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use shared::CorrelationId;

use super::{
    DeleteOutcome, JobRef, JobState, PlatformClient, PlatformError, PlatformResult, RemoteResource,
    ResourceKind, ResourceRef, ResourceSpec,
};
use crate::tracer::CorrelationContext;

/// Wildcard target for injected failures
pub const ANY_TARGET: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOperation {
    Create,
    Get,
    Delete,
    JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub operation: FakeOperation,
    /// Resource name for creates, resource or job id otherwise
    pub target: String,
    pub correlation_id: CorrelationId,
}

struct FakeResource {
    remote: RemoteResource,
    parent: Option<String>,
    deleting: Option<JobRef>,
}

struct FakeJob {
    resource_id: String,
    remaining_polls: u32,
    completed: bool,
}

struct InjectedFailure {
    operation: FakeOperation,
    target: String,
    error: PlatformError,
    remaining: Option<u32>,
}

#[derive(Default)]
struct FakeState {
    resources: BTreeMap<String, FakeResource>,
    jobs: HashMap<String, FakeJob>,
    next_id: u64,
    journal: Vec<JournalEntry>,
    failures: Vec<InjectedFailure>,
    deletion_polls: u32,
    stall_deletions: bool,
    deletions: Vec<String>,
}

impl FakeState {
    fn injected(&mut self, operation: FakeOperation, target: &str) -> Option<PlatformError> {
        let index = self.failures.iter().position(|f| {
            f.operation == operation && (f.target == target || f.target == ANY_TARGET)
        })?;

        let failure = &mut self.failures[index];
        let error = failure.error.clone();
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.failures.remove(index);
            }
        }
        Some(error)
    }

    fn live_children(&self, id: &str) -> usize {
        self.resources
            .values()
            .filter(|r| r.parent.as_deref() == Some(id))
            .count()
    }

    fn finish_deletion(&mut self, id: &str) {
        if self.resources.remove(id).is_some() {
            self.deletions.push(id.to_string());
        }
    }
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletions become jobs that finish after `polls` status checks
    pub fn with_deletion_polls(self, polls: u32) -> Self {
        self.lock().deletion_polls = polls;
        self
    }

    /// Deletion jobs never leave the processing state
    pub fn stall_deletions(&self) {
        self.lock().stall_deletions = true;
    }

    /// Fail `operation` on `target` (or [`ANY_TARGET`]) `times` times, forever when `None`
    pub fn fail(&self, operation: FakeOperation, target: impl Into<String>, error: PlatformError, times: Option<u32>) {
        if times == Some(0) {
            return;
        }
        self.lock().failures.push(InjectedFailure {
            operation,
            target: target.into(),
            error,
            remaining: times,
        });
    }

    pub fn fail_once(&self, operation: FakeOperation, target: impl Into<String>, error: PlatformError) {
        self.fail(operation, target, error, Some(1));
    }

    /// Remove a resource behind the harness's back
    pub fn remove_out_of_band(&self, id: &str) -> bool {
        self.lock().resources.remove(id).is_some()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.lock().resources.contains_key(id)
    }

    pub fn live(&self, kind: ResourceKind) -> Vec<RemoteResource> {
        self.lock()
            .resources
            .values()
            .filter(|r| r.remote.kind == kind)
            .map(|r| r.remote.clone())
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.lock().resources.len()
    }

    /// Ids of removed resources, in the order removal completed
    pub fn deletions(&self) -> Vec<String> {
        self.lock().deletions.clone()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(state: &mut FakeState, operation: FakeOperation, target: &str, correlation: &CorrelationContext) {
        state.journal.push(JournalEntry {
            operation,
            target: target.to_string(),
            correlation_id: correlation.id(),
        });
    }

    fn create_now(&self, spec: &ResourceSpec, correlation: &CorrelationContext) -> PlatformResult<RemoteResource> {
        let mut state = self.lock();
        Self::record(&mut state, FakeOperation::Create, &spec.name, correlation);
        if let Some(error) = state.injected(FakeOperation::Create, &spec.name) {
            return Err(error);
        }

        if let Some(parent) = &spec.parent {
            let usable = state
                .resources
                .get(&parent.id)
                .is_some_and(|p| p.deleting.is_none());
            if !usable {
                return Err(PlatformError::Rejected {
                    status: 422,
                    message: format!("parent {parent} does not exist"),
                });
            }
        }

        state.next_id += 1;
        let id = format!("{}-{:04}", spec.kind.label(), state.next_id);
        let remote = RemoteResource {
            id: id.clone(),
            kind: spec.kind,
            name: spec.name.clone(),
            state: "ready".to_string(),
        };
        state.resources.insert(
            id,
            FakeResource {
                remote: remote.clone(),
                parent: spec.parent.as_ref().map(|p| p.id.clone()),
                deleting: None,
            },
        );
        Ok(remote)
    }

    fn get_now(&self, resource: &ResourceRef, correlation: &CorrelationContext) -> PlatformResult<RemoteResource> {
        let mut state = self.lock();
        Self::record(&mut state, FakeOperation::Get, &resource.id, correlation);
        if let Some(error) = state.injected(FakeOperation::Get, &resource.id) {
            return Err(error);
        }

        match state.resources.get(&resource.id) {
            Some(found) => {
                let mut remote = found.remote.clone();
                if found.deleting.is_some() {
                    remote.state = "deleting".to_string();
                }
                Ok(remote)
            }
            None => Err(PlatformError::NotFound {
                resource: resource.to_string(),
            }),
        }
    }

    fn delete_now(&self, resource: &ResourceRef, correlation: &CorrelationContext) -> PlatformResult<DeleteOutcome> {
        let mut state = self.lock();
        Self::record(&mut state, FakeOperation::Delete, &resource.id, correlation);
        if let Some(error) = state.injected(FakeOperation::Delete, &resource.id) {
            return Err(error);
        }

        let pending = match state.resources.get(&resource.id) {
            None => {
                return Err(PlatformError::NotFound {
                    resource: resource.to_string(),
                });
            }
            Some(found) => found.deleting.clone(),
        };
        if let Some(job) = pending {
            return Ok(DeleteOutcome::Pending(job));
        }

        let children = state.live_children(&resource.id);
        if children > 0 {
            return Err(PlatformError::Rejected {
                status: 422,
                message: format!("{resource} still has {children} dependent resources"),
            });
        }

        if state.deletion_polls == 0 && !state.stall_deletions {
            state.finish_deletion(&resource.id);
            return Ok(DeleteOutcome::Deleted);
        }

        let job = JobRef(format!("job-{}.delete", resource.id));
        let remaining_polls = state.deletion_polls;
        state.jobs.insert(
            job.0.clone(),
            FakeJob {
                resource_id: resource.id.clone(),
                remaining_polls,
                completed: false,
            },
        );
        if let Some(found) = state.resources.get_mut(&resource.id) {
            found.deleting = Some(job.clone());
        }
        Ok(DeleteOutcome::Pending(job))
    }

    fn job_status_now(&self, job: &JobRef, correlation: &CorrelationContext) -> PlatformResult<JobState> {
        let mut state = self.lock();
        Self::record(&mut state, FakeOperation::JobStatus, &job.0, correlation);
        if let Some(error) = state.injected(FakeOperation::JobStatus, &job.0) {
            return Err(error);
        }

        let stalled = state.stall_deletions;
        let finished = match state.jobs.get_mut(&job.0) {
            None => {
                return Err(PlatformError::NotFound {
                    resource: format!("job '{job}'"),
                });
            }
            Some(entry) if entry.completed => return Ok(JobState::Complete),
            Some(_) if stalled => return Ok(JobState::Processing),
            Some(entry) if entry.remaining_polls > 1 => {
                entry.remaining_polls -= 1;
                return Ok(JobState::Processing);
            }
            Some(entry) => {
                entry.completed = true;
                entry.resource_id.clone()
            }
        };

        state.finish_deletion(&finished);
        Ok(JobState::Complete)
    }
}

#[async_trait::async_trait]
impl PlatformClient for FakePlatform {
    async fn create(&self, spec: &ResourceSpec, correlation: &CorrelationContext) -> PlatformResult<RemoteResource> {
        self.create_now(spec, correlation)
    }

    async fn get(&self, resource: &ResourceRef, correlation: &CorrelationContext) -> PlatformResult<RemoteResource> {
        self.get_now(resource, correlation)
    }

    async fn delete(&self, resource: &ResourceRef, correlation: &CorrelationContext) -> PlatformResult<DeleteOutcome> {
        self.delete_now(resource, correlation)
    }

    async fn job_status(&self, job: &JobRef, correlation: &CorrelationContext) -> PlatformResult<JobState> {
        self.job_status_now(job, correlation)
    }
}
