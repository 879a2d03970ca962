//! Per-test resource scope
//!
//! A scope is handed to a test body and kept by the worker that runs it. The
//! worker drains the scope after the body returns, fails or panics, so every
//! resource created through it is removed (children before parents) or the
//! failure is reported.

use std::sync::{Arc, Mutex};

use shared::correlated_error;

use super::manager::ResourceLifecycleManager;
use super::{Ownership, TrackedResource};
use crate::error::{HarnessError, HarnessResult};
use crate::platform::{ResourceKind, ResourceSpec};
use crate::tracer::CorrelationContext;

/// Outcome of draining a set of tracked resources
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Removed resources, in removal order
    pub removed: Vec<TrackedResource>,
    pub failures: Vec<(TrackedResource, HarnessError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Ledger {
    correlation: CorrelationContext,
    created: Mutex<Vec<TrackedResource>>,
}

impl Ledger {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TrackedResource>> {
        match self.created.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        let leaked = self.lock();
        if !leaked.is_empty() {
            let names: Vec<String> = leaked.iter().map(ToString::to_string).collect();
            correlated_error!(
                self.correlation,
                "🚨 Resource scope dropped without cleanup, leaked: {}",
                names.join(", ")
            );
        }
    }
}

/// Cloneable handle onto one test's tracked resources
#[derive(Clone)]
pub struct ResourceScope {
    manager: ResourceLifecycleManager,
    ledger: Arc<Ledger>,
}

impl ResourceScope {
    pub(crate) fn new(manager: ResourceLifecycleManager, correlation: CorrelationContext) -> Self {
        Self {
            manager,
            ledger: Arc::new(Ledger {
                correlation,
                created: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn correlation(&self) -> &CorrelationContext {
        &self.ledger.correlation
    }

    /// Create a test-owned resource and register it for cleanup
    ///
    /// Registration happens before the resource is returned, so a later
    /// failure in the test still removes it.
    pub async fn create(
        &self,
        kind: ResourceKind,
        name: impl Into<String>,
        parent: Option<&TrackedResource>,
    ) -> HarnessResult<TrackedResource> {
        let spec = ResourceSpec {
            kind,
            name: name.into(),
            parent: parent.map(TrackedResource::reference),
        };
        let resource = self
            .manager
            .provision(spec, Ownership::Test, &self.ledger.correlation)
            .await?;

        self.ledger.lock().push(resource.clone());
        Ok(resource)
    }

    /// Resources still awaiting cleanup, in creation order
    pub fn resources(&self) -> Vec<TrackedResource> {
        self.ledger.lock().clone()
    }

    /// Remove every tracked resource, newest first
    ///
    /// The ledger is emptied up front; failures come back in the report
    /// instead of being retried by a later cleanup.
    pub async fn cleanup(&self) -> CleanupReport {
        let resources = std::mem::take(&mut *self.ledger.lock());
        self.manager
            .cleanup_all(&resources, &self.ledger.correlation)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::platform::{DeleteOutcome, MockPlatformClient, PlatformError, RemoteResource};
    use crate::tracer::CorrelationTracer;
    use std::time::Duration;

    fn manager(platform: MockPlatformClient) -> ResourceLifecycleManager {
        ResourceLifecycleManager::new(
            Arc::new(platform),
            RetryPolicy::fixed(Duration::from_millis(10), Duration::from_secs(1)),
        )
    }

    fn creating_platform() -> MockPlatformClient {
        let mut platform = MockPlatformClient::new();
        platform.expect_create().returning(|spec, _| {
            if spec.name == "res2" {
                return Err(PlatformError::Rejected { status: 422, message: "quota exceeded".into() });
            }
            Ok(RemoteResource {
                id: format!("id-{}", spec.name),
                kind: spec.kind,
                name: spec.name.clone(),
                state: "ready".into(),
            })
        });
        platform
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_in_reverse_creation_order() {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let mut platform = creating_platform();
        let sink = deleted.clone();
        platform.expect_delete().returning(move |resource, _| {
            sink.lock().unwrap().push(resource.id.clone());
            Ok(DeleteOutcome::Deleted)
        });

        let scope = manager(platform).scope(CorrelationTracer::new().new_context());
        let r1 = scope.create(ResourceKind::Organization, "r1", None).await.unwrap();
        let r2 = scope.create(ResourceKind::Space, "r2", Some(&r1)).await.unwrap();
        scope.create(ResourceKind::App, "r3", Some(&r2)).await.unwrap();

        let report = scope.cleanup().await;

        assert!(report.is_clean());
        assert_eq!(*deleted.lock().unwrap(), vec!["id-r3", "id-r2", "id-r1"]);
        assert!(scope.resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_create_keeps_earlier_resources_tracked() {
        let mut platform = creating_platform();
        platform
            .expect_delete()
            .times(1)
            .returning(|_, _| Ok(DeleteOutcome::Deleted));

        let scope = manager(platform).scope(CorrelationTracer::new().new_context());
        let res1 = scope.create(ResourceKind::Space, "res1", None).await.unwrap();
        let err = scope.create(ResourceKind::Space, "res2", None).await;

        assert!(err.is_err());
        assert_eq!(scope.resources(), vec![res1.clone()]);

        let report = scope.cleanup().await;
        assert_eq!(report.removed, vec![res1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_reference_is_recorded() {
        let mut platform = creating_platform();
        platform
            .expect_delete()
            .returning(|_, _| Ok(DeleteOutcome::Deleted));

        let scope = manager(platform).scope(CorrelationTracer::new().new_context());
        let org = scope.create(ResourceKind::Organization, "org", None).await.unwrap();
        let space = scope.create(ResourceKind::Space, "space", Some(&org)).await.unwrap();

        assert_eq!(space.parent, Some(org.reference()));
        assert_eq!(space.ownership, Ownership::Test);
        scope.cleanup().await;
    }
}
