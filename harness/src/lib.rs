//! E2E Suite Orchestration Harness
//!
//! Orchestration core for distributed end-to-end suites run against a
//! multi-tenant application platform.
//!
//! ## Main Interface
//!
//! The primary interface is [`SuiteCoordinator`], which runs global setup
//! once on the leader, hands the encoded [`SharedSuiteState`] to every
//! worker, gives each test its own [`ResourceScope`] and correlation id, and
//! tears shared resources down once every worker is done.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use harness::*;
//!
//! async fn creates_a_space(ctx: TestContext) -> anyhow::Result<()> {
//!     let org = ctx.state.shared_org().cloned().ok_or_else(|| anyhow::anyhow!("no org"))?;
//!     ctx.resources.create(ResourceKind::Space, "space-a", Some(&org)).await?;
//!     Ok(())
//! }
//!
//! # async fn example() -> HarnessResult<()> {
//! let config = SuiteConfig::from_env()?;
//! let platform = HttpPlatformClient::new(
//!     &config.connection(),
//!     config.admin_token.clone(),
//!     config.request_timeout,
//! )
//! .map_err(|e| HarnessError::SetupFailure { message: e.to_string() })?;
//!
//! let mut hooks = FailureHookRegistry::new(config.diagnostic_timeout);
//! hooks.register(Matcher::contains("Droplet not found"), ResourceSnapshotHandler);
//!
//! let coordinator = SuiteCoordinator::new(config, Arc::new(platform)).with_hooks(hooks);
//! let report = coordinator
//!     .run(vec![TestCase::new("creates a space", creates_a_space)])
//!     .await;
//!
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod platform;
pub mod rendezvous;
pub mod tracer;

// Main interfaces - re-exported at crate root for convenience
pub use codec::{SharedStateCodec, SharedSuiteState};
pub use config::{ConnectionConfig, RetryPolicy, SuiteConfig, SuiteConfigBuilder};
pub use coordinator::{RunReport, SuiteCoordinator, SuitePhase, TestCase, TestContext};
pub use error::{HarnessError, HarnessResult};
pub use hooks::{FailureHookRegistry, FailureRecord, Matcher};
pub use lifecycle::{ResourceLifecycleManager, ResourceScope, TrackedResource};
pub use tracer::{CorrelationContext, CorrelationTracer};

// Supporting types
pub use coordinator::{Deployer, GlobalSetup, StandardSetup, TeardownFailure, TestVerdict, WorkerReport};
pub use hooks::{CorrelationReplayHandler, DiagnosticHandler, DispatchPolicy, FnHandler, ResourceSnapshotHandler};
pub use lifecycle::{CleanupReport, Ownership};
pub use platform::{FakePlatform, HttpPlatformClient, PlatformClient, PlatformError, ResourceKind};
pub use rendezvous::FileRendezvous;
