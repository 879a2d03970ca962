//! Test helpers for harness integration tests
//!
//! Setup doubles, ready-made test bodies and a coordinator factory wired to
//! the in-memory platform.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use harness::coordinator::SetupContext;
use harness::*;

/// Standard setup that counts how often it is invoked
pub struct CountingSetup {
    calls: Arc<AtomicUsize>,
    inner: StandardSetup,
}

impl CountingSetup {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let setup = Self {
            calls: calls.clone(),
            inner: StandardSetup::default(),
        };
        (setup, calls)
    }
}

#[async_trait::async_trait]
impl GlobalSetup for CountingSetup {
    async fn provision(&self, ctx: SetupContext<'_>) -> HarnessResult<SharedSuiteState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.provision(ctx).await
    }
}

/// Creates a single shared organization, optionally failing right after
pub struct OrgOnlySetup {
    org_name: String,
    fail_after_create: bool,
}

impl OrgOnlySetup {
    pub fn new(org_name: &str) -> Self {
        Self {
            org_name: org_name.to_string(),
            fail_after_create: false,
        }
    }

    pub fn failing_after_create(org_name: &str) -> Self {
        Self {
            org_name: org_name.to_string(),
            fail_after_create: true,
        }
    }
}

#[async_trait::async_trait]
impl GlobalSetup for OrgOnlySetup {
    async fn provision(&self, ctx: SetupContext<'_>) -> HarnessResult<SharedSuiteState> {
        ctx.lifecycle
            .create_shared(ResourceKind::Organization, self.org_name.clone(), None, &ctx.correlation)
            .await?;

        if self.fail_after_create {
            return Err(HarnessError::SetupFailure {
                message: "service broker registration failed".to_string(),
            });
        }

        let mut state = SharedSuiteState::new(ctx.run_id, "token", ctx.config.connection());
        state.shared_resources = ctx.lifecycle.shared_resources();
        Ok(state)
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    pub fn coordinator(platform: &FakePlatform, config: SuiteConfig) -> SuiteCoordinator {
        SuiteCoordinator::new(config, Arc::new(platform.clone()))
    }

    /// Creates a space under the shared organization and reads it back
    pub fn space_under_shared_org(space_name: &str) -> TestCase {
        let space_name = space_name.to_string();
        TestCase::new(format!("creates {space_name}"), move |ctx| {
            create_space(ctx, space_name.clone())
        })
    }

    pub fn passing(name: &str) -> TestCase {
        TestCase::new(name, |_ctx| async { Ok::<(), anyhow::Error>(()) })
    }

    pub fn failing(name: &str, message: &str) -> TestCase {
        let message = message.to_string();
        TestCase::new(name, move |ctx| fail_with(ctx, message.clone()))
    }

    pub fn panicking(name: &str) -> TestCase {
        TestCase::new(name, |ctx| panic_in(ctx))
    }

    /// Creates `res1` then `res2`; the caller decides whether `res2` fails
    pub fn two_resources(name: &str) -> TestCase {
        TestCase::new(name, create_two)
    }

    pub fn assert_no_leaks(platform: &FakePlatform) {
        assert_eq!(
            platform.live_count(),
            0,
            "leaked resources: orgs={:?} spaces={:?} apps={:?}",
            platform.live(ResourceKind::Organization),
            platform.live(ResourceKind::Space),
            platform.live(ResourceKind::App)
        );
    }
}

async fn create_space(ctx: TestContext, space_name: String) -> anyhow::Result<()> {
    let org = ctx
        .state
        .shared_org()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("suite state has no shared organization"))?;

    let space = ctx
        .resources
        .create(ResourceKind::Space, space_name, Some(&org))
        .await?;
    let remote = ctx.platform.get(&space.reference(), ctx.correlation()).await?;

    anyhow::ensure!(remote.name == space.name, "space read back as '{}'", remote.name);
    Ok(())
}

async fn create_two(ctx: TestContext) -> anyhow::Result<()> {
    ctx.resources.create(ResourceKind::Space, "res1", None).await?;
    ctx.resources.create(ResourceKind::Space, "res2", None).await?;
    Ok(())
}

async fn fail_with(_ctx: TestContext, message: String) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(message))
}

async fn panic_in(_ctx: TestContext) -> anyhow::Result<()> {
    panic!("worker exploded mid-test");
}
