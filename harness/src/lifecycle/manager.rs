//! Resource lifecycle manager
//!
//! Wraps the platform client with bounded retry for transient failures,
//! idempotent deletes and polling of asynchronous deletion jobs. Nothing is
//! reported as cleaned up while its deletion is still in flight.

use std::sync::{Arc, Mutex};

use shared::{correlated_debug, correlated_info, correlated_warn};
use tokio::time::timeout_at;

use super::poll::Attempts;
use super::scope::{CleanupReport, ResourceScope};
use super::{Ownership, TrackedResource};
use crate::config::RetryPolicy;
use crate::error::{HarnessError, HarnessResult, ResourceOp};
use crate::platform::{
    DeleteOutcome, JobRef, JobState, PlatformClient, PlatformError, ResourceKind, ResourceSpec,
};
use crate::tracer::CorrelationContext;

#[derive(Clone)]
pub struct ResourceLifecycleManager {
    platform: Arc<dyn PlatformClient>,
    policy: RetryPolicy,
    /// Suite-shared resources in creation order
    shared: Arc<Mutex<Vec<TrackedResource>>>,
}

impl ResourceLifecycleManager {
    pub fn new(platform: Arc<dyn PlatformClient>, policy: RetryPolicy) -> Self {
        Self {
            platform,
            policy,
            shared: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Open a per-test scope whose resources are removed LIFO on cleanup
    pub fn scope(&self, correlation: CorrelationContext) -> ResourceScope {
        ResourceScope::new(self.clone(), correlation)
    }

    /// Create a resource that lives until global teardown
    pub async fn create_shared(
        &self,
        kind: ResourceKind,
        name: impl Into<String>,
        parent: Option<&TrackedResource>,
        correlation: &CorrelationContext,
    ) -> HarnessResult<TrackedResource> {
        let spec = ResourceSpec {
            kind,
            name: name.into(),
            parent: parent.map(TrackedResource::reference),
        };
        let resource = self
            .provision(spec, Ownership::SuiteShared, correlation)
            .await?;

        self.lock_shared().push(resource.clone());
        Ok(resource)
    }

    /// Suite-shared resources registered so far, in creation order
    pub fn shared_resources(&self) -> Vec<TrackedResource> {
        self.lock_shared().clone()
    }

    /// Remove and return every registered suite-shared resource
    pub fn take_shared_resources(&self) -> Vec<TrackedResource> {
        std::mem::take(&mut *self.lock_shared())
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Vec<TrackedResource>> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create with retry; the caller decides where the resource is registered
    pub(crate) async fn provision(
        &self,
        spec: ResourceSpec,
        ownership: Ownership,
        correlation: &CorrelationContext,
    ) -> HarnessResult<TrackedResource> {
        let label = format!("{} '{}'", spec.kind, spec.name);
        let mut attempts = Attempts::new(&self.policy);

        loop {
            match timeout_at(attempts.deadline(), self.platform.create(&spec, correlation)).await {
                Err(_) => {
                    return Err(attempts.timeout(label, "create request still in flight"));
                }
                Ok(Ok(remote)) => {
                    let resource = TrackedResource {
                        id: remote.id,
                        kind: spec.kind,
                        name: spec.name.clone(),
                        parent: spec.parent.clone(),
                        ownership,
                    };
                    correlated_info!(
                        correlation,
                        resource_id = %resource.id,
                        "🧱 Created {}",
                        resource
                    );
                    return Ok(resource);
                }
                Ok(Err(e)) if e.is_transient() => {
                    correlated_warn!(
                        correlation,
                        attempt = attempts.attempt(),
                        "🔁 Transient failure creating {}: {}",
                        label,
                        e
                    );
                    if !attempts.pause().await {
                        return Err(attempts.timeout(label, format!("create retrying after: {e}")));
                    }
                }
                Ok(Err(e)) => {
                    return Err(HarnessError::ResourceOperation {
                        operation: ResourceOp::Create,
                        resource: label,
                        source: e,
                    });
                }
            }
        }
    }

    /// Remove a resource, waiting for any deletion job to finish
    ///
    /// A resource that is already gone counts as removed.
    pub async fn cleanup(
        &self,
        resource: &TrackedResource,
        correlation: &CorrelationContext,
    ) -> HarnessResult<()> {
        let reference = resource.reference();
        let label = resource.to_string();
        let mut attempts = Attempts::new(&self.policy);

        let job = loop {
            match timeout_at(attempts.deadline(), self.platform.delete(&reference, correlation)).await {
                Err(_) => {
                    return Err(attempts.timeout(label, "delete request still in flight"));
                }
                Ok(Ok(DeleteOutcome::Deleted)) => {
                    correlated_info!(correlation, resource_id = %resource.id, "🗑️ Deleted {}", label);
                    return Ok(());
                }
                Ok(Ok(DeleteOutcome::Pending(job))) => break job,
                Ok(Err(e)) if e.is_not_found() => {
                    correlated_debug!(
                        correlation,
                        resource_id = %resource.id,
                        "✅ {} already removed",
                        label
                    );
                    return Ok(());
                }
                Ok(Err(e)) if e.is_transient() => {
                    correlated_warn!(
                        correlation,
                        resource_id = %resource.id,
                        "🔁 Transient failure deleting {}: {}",
                        label,
                        e
                    );
                    if !attempts.pause().await {
                        return Err(attempts.timeout(label, format!("delete retrying after: {e}")));
                    }
                }
                Ok(Err(e)) => {
                    return Err(HarnessError::ResourceOperation {
                        operation: ResourceOp::Delete,
                        resource: label,
                        source: e,
                    });
                }
            }
        };

        self.await_deletion_job(resource, &label, &job, &mut attempts, correlation)
            .await
    }

    async fn await_deletion_job(
        &self,
        resource: &TrackedResource,
        label: &str,
        job: &JobRef,
        attempts: &mut Attempts<'_>,
        correlation: &CorrelationContext,
    ) -> HarnessResult<()> {
        let mut last_state = format!("deletion job {job} accepted");
        correlated_debug!(correlation, resource_id = %resource.id, "⏳ {} for {}", last_state, label);

        loop {
            match timeout_at(attempts.deadline(), self.platform.job_status(job, correlation)).await {
                Err(_) => return Err(attempts.timeout(label, last_state)),
                Ok(Ok(JobState::Complete)) => {
                    correlated_info!(correlation, resource_id = %resource.id, "🗑️ Deleted {}", label);
                    return Ok(());
                }
                Ok(Ok(JobState::Failed(reason))) => {
                    return Err(HarnessError::ResourceOperation {
                        operation: ResourceOp::Delete,
                        resource: label.to_string(),
                        source: PlatformError::JobFailed {
                            job: job.clone(),
                            reason,
                        },
                    });
                }
                Ok(Ok(state)) => {
                    last_state = format!("deletion job {job} {state}");
                }
                Ok(Err(e)) if e.is_not_found() => {
                    // Finished jobs may be reaped; the resource itself is the source of truth
                    return self.confirm_absent(resource, label, attempts, correlation).await;
                }
                Ok(Err(e)) if e.is_transient() => {
                    last_state = format!("polling deletion job {job} after: {e}");
                }
                Ok(Err(e)) => {
                    return Err(HarnessError::ResourceOperation {
                        operation: ResourceOp::Delete,
                        resource: label.to_string(),
                        source: e,
                    });
                }
            }

            if !attempts.pause().await {
                return Err(attempts.timeout(label, last_state));
            }
        }
    }

    async fn confirm_absent(
        &self,
        resource: &TrackedResource,
        label: &str,
        attempts: &mut Attempts<'_>,
        correlation: &CorrelationContext,
    ) -> HarnessResult<()> {
        let reference = resource.reference();
        let mut last_state = String::from("deletion job reaped, confirming removal");

        loop {
            match timeout_at(attempts.deadline(), self.platform.get(&reference, correlation)).await {
                Err(_) => return Err(attempts.timeout(label, last_state)),
                Ok(Err(e)) if e.is_not_found() => {
                    correlated_info!(correlation, resource_id = %resource.id, "🗑️ Deleted {}", label);
                    return Ok(());
                }
                Ok(Err(e)) if e.is_transient() => {
                    last_state = format!("confirming removal after: {e}");
                }
                Ok(Err(e)) => {
                    return Err(HarnessError::ResourceOperation {
                        operation: ResourceOp::Read,
                        resource: label.to_string(),
                        source: e,
                    });
                }
                Ok(Ok(remote)) => {
                    return Err(HarnessError::ResourceOperation {
                        operation: ResourceOp::Delete,
                        resource: label.to_string(),
                        source: PlatformError::InvalidResponse {
                            message: format!(
                                "deletion job vanished while resource is still present in state '{}'",
                                remote.state
                            ),
                        },
                    });
                }
            }

            if !attempts.pause().await {
                return Err(attempts.timeout(label, last_state));
            }
        }
    }

    /// Remove resources in reverse of the given creation order
    ///
    /// Every resource is attempted even when an earlier removal fails.
    pub async fn cleanup_all(
        &self,
        resources: &[TrackedResource],
        correlation: &CorrelationContext,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        for resource in resources.iter().rev() {
            match self.cleanup(resource, correlation).await {
                Ok(()) => report.removed.push(resource.clone()),
                Err(e) => {
                    correlated_warn!(
                        correlation,
                        resource_id = %resource.id,
                        "⚠️ Cleanup of {} failed: {}",
                        resource,
                        e
                    );
                    report.failures.push((resource.clone(), e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MockPlatformClient, RemoteResource, ResourceRef};
    use crate::tracer::CorrelationTracer;
    use std::time::Duration;

    /// Accepts deletes as jobs that are immediately reaped, then never answers reads
    struct UnansweredReads;

    #[async_trait::async_trait]
    impl PlatformClient for UnansweredReads {
        async fn create(&self, spec: &ResourceSpec, _: &CorrelationContext) -> crate::platform::PlatformResult<RemoteResource> {
            Err(PlatformError::Rejected { status: 405, message: format!("unexpected create of {}", spec.name) })
        }

        async fn get(&self, _: &ResourceRef, _: &CorrelationContext) -> crate::platform::PlatformResult<RemoteResource> {
            std::future::pending().await
        }

        async fn delete(&self, _: &ResourceRef, _: &CorrelationContext) -> crate::platform::PlatformResult<DeleteOutcome> {
            Ok(DeleteOutcome::Pending(JobRef("job-reaped".into())))
        }

        async fn job_status(&self, job: &JobRef, _: &CorrelationContext) -> crate::platform::PlatformResult<JobState> {
            Err(PlatformError::NotFound { resource: job.to_string() })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(10), Duration::from_secs(1))
    }

    fn space(id: &str) -> TrackedResource {
        TrackedResource {
            id: id.to_string(),
            kind: ResourceKind::Space,
            name: format!("name-{id}"),
            parent: None,
            ownership: Ownership::Test,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_transient_errors() {
        let mut platform = MockPlatformClient::new();
        let mut calls = 0;
        platform.expect_create().times(3).returning(move |spec, _| {
            calls += 1;
            if calls < 3 {
                Err(PlatformError::Transient { message: "connection reset".into() })
            } else {
                Ok(RemoteResource {
                    id: "space-guid".into(),
                    kind: spec.kind,
                    name: spec.name.clone(),
                    state: "ready".into(),
                })
            }
        });

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        let resource = manager
            .create_shared(ResourceKind::Space, "shared-space", None, &correlation)
            .await
            .unwrap();

        assert_eq!(resource.id, "space-guid");
        assert!(resource.is_shared());
        assert_eq!(manager.shared_resources(), vec![resource]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_surfaces_permanent_errors_without_retry() {
        let mut platform = MockPlatformClient::new();
        platform.expect_create().times(1).returning(|_, _| {
            Err(PlatformError::Rejected { status: 422, message: "name taken".into() })
        });

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        let err = manager
            .create_shared(ResourceKind::Organization, "org-a", None, &correlation)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HarnessError::ResourceOperation { operation: ResourceOp::Create, .. }
        ));
        assert!(manager.shared_resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_treats_not_found_as_success() {
        let mut platform = MockPlatformClient::new();
        platform.expect_delete().times(1).returning(|resource, _| {
            Err(PlatformError::NotFound { resource: resource.to_string() })
        });

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        assert!(manager.cleanup(&space("gone"), &correlation).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_polls_job_to_completion() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_delete()
            .times(1)
            .returning(|_, _| Ok(DeleteOutcome::Pending(JobRef("job-1".into()))));
        let mut polls = 0;
        platform.expect_job_status().times(3).returning(move |_, _| {
            polls += 1;
            Ok(if polls < 3 { JobState::Processing } else { JobState::Complete })
        });

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        assert!(manager.cleanup(&space("s1"), &correlation).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_a_resource_failure() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_delete()
            .returning(|_, _| Ok(DeleteOutcome::Pending(JobRef("job-2".into()))));
        platform
            .expect_job_status()
            .returning(|_, _| Ok(JobState::Failed("finalizer stuck".into())));

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        let err = manager.cleanup(&space("s2"), &correlation).await.unwrap_err();

        assert!(err.to_string().contains("finalizer stuck"));
        assert_eq!(err.resource(), Some("space 'name-s2' (s2)"));
        assert!(matches!(
            err,
            HarnessError::ResourceOperation {
                source: PlatformError::JobFailed { ref job, .. },
                ..
            } if job.0 == "job-2"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaped_job_confirms_absence_through_get() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_delete()
            .returning(|_, _| Ok(DeleteOutcome::Pending(JobRef("job-3".into()))));
        platform
            .expect_job_status()
            .returning(|job, _| Err(PlatformError::NotFound { resource: job.to_string() }));
        platform
            .expect_get()
            .times(1)
            .returning(|resource, _| Err(PlatformError::NotFound { resource: resource.to_string() }));

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        assert!(manager.cleanup(&space("s3"), &correlation).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirming_removal_retries_transient_reads() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_delete()
            .returning(|_, _| Ok(DeleteOutcome::Pending(JobRef("job-5".into()))));
        platform
            .expect_job_status()
            .returning(|job, _| Err(PlatformError::NotFound { resource: job.to_string() }));
        let mut reads = 0;
        platform.expect_get().times(3).returning(move |resource, _| {
            reads += 1;
            if reads < 3 {
                Err(PlatformError::Transient { message: "502 Bad Gateway".into() })
            } else {
                Err(PlatformError::NotFound { resource: resource.to_string() })
            }
        });

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        assert!(manager.cleanup(&space("s5"), &correlation).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_read_after_reaped_job_hits_the_deadline() {
        let manager = ResourceLifecycleManager::new(Arc::new(UnansweredReads), policy());
        let correlation = CorrelationTracer::new().new_context();

        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            manager.cleanup(&space("s6"), &correlation),
        )
        .await
        .expect("cleanup must respect its own deadline");

        match outcome.unwrap_err() {
            HarnessError::Timeout { resource, last_state, .. } => {
                assert_eq!(resource, "space 'name-s6' (s6)");
                assert!(last_state.contains("confirming removal"), "{last_state}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_job_times_out_naming_resource_and_state() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_delete()
            .returning(|_, _| Ok(DeleteOutcome::Pending(JobRef("job-4".into()))));
        platform
            .expect_job_status()
            .returning(|_, _| Ok(JobState::Processing));

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        let err = manager.cleanup(&space("s4"), &correlation).await.unwrap_err();

        match err {
            HarnessError::Timeout { resource, last_state, .. } => {
                assert_eq!(resource, "space 'name-s4' (s4)");
                assert_eq!(last_state, "deletion job job-4 PROCESSING");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_all_continues_after_failures() {
        let mut platform = MockPlatformClient::new();
        platform.expect_delete().times(3).returning(|resource, _| {
            if resource.id == "middle" {
                Err(PlatformError::Rejected { status: 403, message: "forbidden".into() })
            } else {
                Ok(DeleteOutcome::Deleted)
            }
        });

        let manager = ResourceLifecycleManager::new(Arc::new(platform), policy());
        let correlation = CorrelationTracer::new().new_context();
        let resources = vec![space("first"), space("middle"), space("last")];
        let report = manager.cleanup_all(&resources, &correlation).await;

        let removed: Vec<_> = report.removed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(removed, vec!["last", "first"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0.id, "middle");
    }
}
