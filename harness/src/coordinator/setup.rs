//! One-time global setup
//!
//! [`GlobalSetup`] is what the leader runs exactly once before any worker
//! starts. [`StandardSetup`] deploys the platform (unless told not to),
//! checks for an admin credential and provisions the suite-shared
//! organization and space every test builds on.

use std::sync::Arc;

use shared::{RunId, correlated_info};

use crate::codec::SharedSuiteState;
use crate::config::SuiteConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::lifecycle::ResourceLifecycleManager;
use crate::platform::ResourceKind;
use crate::tracer::CorrelationContext;

/// Brings the platform under test up before the suite runs
#[mockall::automock]
#[async_trait::async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, config: &SuiteConfig) -> anyhow::Result<()>;
}

/// Deployer for platforms that are already running
pub struct NoopDeployer;

#[async_trait::async_trait]
impl Deployer for NoopDeployer {
    async fn deploy(&self, _config: &SuiteConfig) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Everything a setup routine may use
pub struct SetupContext<'a> {
    pub run_id: RunId,
    pub config: &'a SuiteConfig,
    /// Shared resources created through this are torn down after the run
    pub lifecycle: &'a ResourceLifecycleManager,
    pub correlation: CorrelationContext,
}

#[async_trait::async_trait]
pub trait GlobalSetup: Send + Sync {
    async fn provision(&self, ctx: SetupContext<'_>) -> HarnessResult<SharedSuiteState>;
}

pub struct StandardSetup {
    deployer: Arc<dyn Deployer>,
}

impl StandardSetup {
    pub fn new(deployer: Arc<dyn Deployer>) -> Self {
        Self { deployer }
    }
}

impl Default for StandardSetup {
    fn default() -> Self {
        Self::new(Arc::new(NoopDeployer))
    }
}

#[async_trait::async_trait]
impl GlobalSetup for StandardSetup {
    async fn provision(&self, ctx: SetupContext<'_>) -> HarnessResult<SharedSuiteState> {
        let config = ctx.config;

        if config.skip_deploy {
            correlated_info!(ctx.correlation, "⏭️ Skipping platform deployment");
        } else {
            correlated_info!(ctx.correlation, "🚀 Deploying platform under test");
            self.deployer
                .deploy(config)
                .await
                .map_err(|e| HarnessError::SetupFailure {
                    message: format!("deployment failed: {e:#}"),
                })?;
        }

        let token = config
            .admin_token
            .clone()
            .ok_or_else(|| HarnessError::SetupFailure {
                message: "no admin credential configured".to_string(),
            })?;

        let prefix = format!("{}-{}", config.resource_prefix, ctx.run_id.short());
        let org = ctx
            .lifecycle
            .create_shared(ResourceKind::Organization, format!("{prefix}-org"), None, &ctx.correlation)
            .await?;
        ctx.lifecycle
            .create_shared(ResourceKind::Space, format!("{prefix}-space"), Some(&org), &ctx.correlation)
            .await?;

        let mut state = SharedSuiteState::new(ctx.run_id, token, config.connection());
        state.shared_resources = ctx.lifecycle.shared_resources();
        state
            .fixtures
            .insert("apps_domain".to_string(), config.apps_domain.clone());
        Ok(state)
    }
}
