//! Suite coordinator
//!
//! Drives a run end to end: leader-only setup exactly once, distribution of
//! the encoded state to every worker, a barrier over all workers (failed and
//! panicked ones included), then leader-only best-effort teardown exactly
//! once. The phase tracker is the guard for both "exactly once" rules.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use shared::{NodeId, RunId, correlated_error, correlated_info, correlated_warn};

use super::phase::{PhaseTracker, SuitePhase};
use super::report::{RunReport, TeardownFailure, WorkerReport};
use super::setup::{Deployer, GlobalSetup, SetupContext, StandardSetup};
use super::worker::{TestCase, Worker};
use crate::codec::{SharedStateCodec, SharedSuiteState};
use crate::config::SuiteConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::hooks::FailureHookRegistry;
use crate::lifecycle::ResourceLifecycleManager;
use crate::platform::PlatformClient;
use crate::rendezvous::FileRendezvous;
use crate::tracer::CorrelationTracer;

pub struct SuiteCoordinator {
    role: NodeId,
    run_id: RunId,
    config: SuiteConfig,
    lifecycle: ResourceLifecycleManager,
    tracer: CorrelationTracer,
    hooks: Arc<FailureHookRegistry>,
    setup: Arc<dyn GlobalSetup>,
    phase: Mutex<PhaseTracker>,
}

impl SuiteCoordinator {
    /// Leader coordinator with the standard setup and no diagnostic hooks
    pub fn new(config: SuiteConfig, platform: Arc<dyn PlatformClient>) -> Self {
        let lifecycle = ResourceLifecycleManager::new(platform, config.retry.clone());
        let tracer = CorrelationTracer::with_header(config.correlation_header.clone());
        let hooks = FailureHookRegistry::new(config.diagnostic_timeout);

        Self {
            role: NodeId::Leader,
            run_id: RunId::new(),
            config,
            lifecycle,
            tracer,
            hooks: Arc::new(hooks),
            setup: Arc::new(StandardSetup::default()),
            phase: Mutex::new(PhaseTracker::new()),
        }
    }

    pub fn with_role(mut self, role: NodeId) -> Self {
        self.role = role;
        self
    }

    pub fn with_hooks(mut self, hooks: FailureHookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_setup(mut self, setup: impl GlobalSetup + 'static) -> Self {
        self.setup = Arc::new(setup);
        self
    }

    pub fn with_deployer(self, deployer: Arc<dyn Deployer>) -> Self {
        self.with_setup(StandardSetup::new(deployer))
    }

    pub fn role(&self) -> NodeId {
        self.role
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &ResourceLifecycleManager {
        &self.lifecycle
    }

    pub fn tracer(&self) -> &CorrelationTracer {
        &self.tracer
    }

    pub fn phase(&self) -> SuitePhase {
        self.lock_phase().current()
    }

    pub fn phase_history(&self) -> Vec<(SuitePhase, DateTime<Utc>)> {
        self.lock_phase().history().to_vec()
    }

    fn lock_phase(&self) -> MutexGuard<'_, PhaseTracker> {
        match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn advance(&self, next: SuitePhase) -> HarnessResult<()> {
        self.lock_phase().advance(next)
    }

    /// Run global setup; leader only, exactly once per run
    ///
    /// On failure any suite-shared resources already created are removed
    /// and the run moves straight to `Complete`.
    pub async fn run_global_setup(&self) -> HarnessResult<SharedSuiteState> {
        if !self.role.is_leader() {
            return Err(HarnessError::SetupFailure {
                message: format!("global setup may only run on the leader, not {}", self.role),
            });
        }
        if let Err(e) = self.advance(SuitePhase::LeaderSetupRunning) {
            return Err(HarnessError::SetupFailure {
                message: format!("global setup already ran for this run ({e})"),
            });
        }

        let correlation = self.tracer.new_context();
        correlated_info!(correlation, run_id = %self.run_id, "🏗️ Running global setup");

        let result = self
            .setup
            .provision(SetupContext {
                run_id: self.run_id,
                config: &self.config,
                lifecycle: &self.lifecycle,
                correlation,
            })
            .await;

        match result {
            Ok(state) => {
                correlated_info!(
                    correlation,
                    run_id = %self.run_id,
                    "✅ Global setup complete, {} shared resources",
                    state.shared_resources.len()
                );
                Ok(state)
            }
            Err(e) => {
                correlated_error!(correlation, run_id = %self.run_id, "❌ Global setup failed: {}", e);
                self.abandon_setup().await;
                Err(match e {
                    HarnessError::SetupFailure { .. } => e,
                    other => HarnessError::SetupFailure {
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    async fn abandon_setup(&self) {
        let partial = self.lifecycle.take_shared_resources();
        if !partial.is_empty() {
            let correlation = self.tracer.new_context();
            let report = self.lifecycle.cleanup_all(&partial, &correlation).await;
            if !report.is_clean() {
                correlated_warn!(
                    correlation,
                    "⚠️ {} shared resources from the failed setup could not be removed",
                    report.failures.len()
                );
            }
        }
        if let Err(e) = self.advance(SuitePhase::Complete) {
            tracing::warn!("⚠️ {}", e);
        }
    }

    /// Encode state for the workers
    pub fn distribute_state(&self, state: &SharedSuiteState) -> HarnessResult<Vec<u8>> {
        let encoded = SharedStateCodec::encode(state)?;
        let mut phase = self.lock_phase();
        if phase.current() == SuitePhase::LeaderSetupRunning {
            phase.advance(SuitePhase::StateDistributed)?;
        }
        Ok(encoded)
    }

    pub fn adopt_state(&self, encoded: &[u8]) -> HarnessResult<SharedSuiteState> {
        SharedStateCodec::decode(encoded)
    }

    /// Best-effort removal of every suite-shared resource, newest first
    ///
    /// Only legal once every worker has finished. Failures are collected,
    /// never raised.
    pub async fn run_global_teardown(&self, state: &SharedSuiteState) -> Vec<TeardownFailure> {
        let correlation = self.tracer.new_context();
        let refuse = |message: String| {
            correlated_error!(correlation, "❌ {}", message);
            vec![TeardownFailure {
                resource: None,
                message,
                correlation_id: correlation.id(),
            }]
        };

        if !self.role.is_leader() {
            return refuse(format!("global teardown may only run on the leader, not {}", self.role));
        }
        if let Err(e) = self.advance(SuitePhase::TeardownRunning) {
            return refuse(format!("global teardown refused: {e}"));
        }

        let mut resources = state.shared_resources.clone();
        for resource in self.lifecycle.take_shared_resources() {
            if !resources.iter().any(|r| r.id == resource.id) {
                resources.push(resource);
            }
        }

        correlated_info!(correlation, "🧹 Tearing down {} shared resources", resources.len());
        let report = self.lifecycle.cleanup_all(&resources, &correlation).await;

        let failures: Vec<TeardownFailure> = report
            .failures
            .into_iter()
            .map(|(resource, error)| TeardownFailure {
                resource: Some(resource),
                message: error.to_string(),
                correlation_id: correlation.id(),
            })
            .collect();

        if let Err(e) = self.advance(SuitePhase::Complete) {
            tracing::warn!("⚠️ {}", e);
        }
        correlated_info!(
            correlation,
            "🏁 Teardown complete: {} removed, {} failures",
            report.removed.len(),
            failures.len()
        );
        failures
    }

    /// Run a whole suite in-process with `config.workers` parallel workers
    pub async fn run(&self, tests: Vec<TestCase>) -> RunReport {
        let state = match self.run_global_setup().await {
            Ok(state) => state,
            Err(e) => return RunReport::aborted(self.run_id, e.to_string()),
        };
        let encoded = match self.distribute_state(&state) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.abandon_setup().await;
                return RunReport::aborted(self.run_id, e.to_string());
            }
        };

        let nodes = (1..=self.config.workers.max(1)).map(NodeId::Worker).collect();
        let mut report = RunReport::new(self.run_id);
        report.workers = self.run_local_workers(encoded, tests, nodes).await;
        report.teardown_failures = self.finish(&state).await;
        self.log_summary(&report);
        report
    }

    /// Leader side of a multi-process run
    ///
    /// Clears whatever an earlier run left in the rendezvous directory,
    /// publishes state (or an abort), runs its own share of tests, waits for
    /// `followers` completion markers of this run and tears down. Followers
    /// that never report are counted as failed workers. The published state
    /// is withdrawn once teardown has finished.
    pub async fn run_leader_node(&self, rendezvous: &FileRendezvous, followers: u32, tests: Vec<TestCase>) -> RunReport {
        if let Err(e) = rendezvous.reset().await {
            tracing::error!("❌ Could not clear rendezvous directory {}: {}", rendezvous.dir().display(), e);
            return RunReport::aborted(self.run_id, format!("rendezvous directory unusable: {e}"));
        }

        let state = match self.run_global_setup().await {
            Ok(state) => state,
            Err(e) => {
                if let Err(publish) = rendezvous.publish_abort(&e.to_string()).await {
                    tracing::error!("❌ Could not publish abort marker: {}", publish);
                }
                return RunReport::aborted(self.run_id, e.to_string());
            }
        };

        let published = match self.distribute_state(&state) {
            Ok(encoded) => rendezvous.publish_state(&encoded).await.map(|()| encoded),
            Err(e) => Err(e),
        };
        let encoded = match published {
            Ok(encoded) => encoded,
            Err(e) => {
                if let Err(publish) = rendezvous.publish_abort(&e.to_string()).await {
                    tracing::error!("❌ Could not publish abort marker: {}", publish);
                }
                self.abandon_setup().await;
                return RunReport::aborted(self.run_id, e.to_string());
            }
        };

        let mut report = RunReport::new(self.run_id);
        report.workers = self.run_local_workers(encoded, tests, vec![NodeId::Leader]).await;

        let markers = match rendezvous
            .await_all_done(self.run_id, followers, self.config.rendezvous_timeout)
            .await
        {
            Ok(markers) => markers,
            Err(e) => {
                tracing::error!("❌ {}", e);
                rendezvous.completed(self.run_id).await.unwrap_or_default()
            }
        };
        for index in 1..=followers {
            let node = NodeId::Worker(index);
            let worker = match markers.iter().find(|(n, _)| *n == node) {
                Some((_, true)) => WorkerReport::new(node),
                Some((_, false)) => WorkerReport::failed(node, "worker reported failing tests"),
                None => WorkerReport::failed(node, "worker never reported completion"),
            };
            report.workers.push(worker);
        }

        report.teardown_failures = self.finish(&state).await;
        if let Err(e) = rendezvous.retire_state().await {
            tracing::warn!("⚠️ Could not withdraw published suite state: {}", e);
        }
        self.log_summary(&report);
        report
    }

    /// Follower side of a multi-process run
    ///
    /// Always drops a completion marker, even when the state never arrives,
    /// so the leader's barrier is not held up.
    pub async fn run_follower_node(&self, rendezvous: &FileRendezvous, tests: Vec<TestCase>) -> WorkerReport {
        let mut run_id = None;
        let report = match rendezvous.await_state(self.config.rendezvous_timeout).await {
            Ok(encoded) => {
                run_id = self.adopt_state(&encoded).ok().map(|state| state.run_id);
                let entered = self
                    .advance(SuitePhase::StateDistributed)
                    .and_then(|()| self.advance(SuitePhase::WorkersRunning));
                match entered {
                    Ok(()) => {
                        let report = self.worker(self.role).run(Arc::new(encoded), tests).await;
                        if let Err(e) = self.advance(SuitePhase::AllWorkersDone) {
                            tracing::warn!("⚠️ {}", e);
                        }
                        report
                    }
                    Err(e) => WorkerReport::failed(self.role, e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(worker = %self.role, "❌ No suite state: {}", e);
                WorkerReport::failed(self.role, e.to_string())
            }
        };

        if let Err(e) = rendezvous.signal_done(self.role, run_id, report.passed()).await {
            tracing::error!(worker = %self.role, "❌ Could not signal completion: {}", e);
        }
        report
    }

    fn worker(&self, node: NodeId) -> Worker {
        Worker {
            node,
            lifecycle: self.lifecycle.clone(),
            tracer: self.tracer.clone(),
            hooks: self.hooks.clone(),
        }
    }

    /// Round-robin tests over in-process workers and wait for all of them
    async fn run_local_workers(&self, encoded: Vec<u8>, tests: Vec<TestCase>, nodes: Vec<NodeId>) -> Vec<WorkerReport> {
        if let Err(e) = self.advance(SuitePhase::WorkersRunning) {
            tracing::error!("❌ {}", e);
        }

        let count = nodes.len().max(1);
        let mut buckets: Vec<Vec<TestCase>> = vec![Vec::new(); count];
        for (index, test) in tests.into_iter().enumerate() {
            buckets[index % count].push(test);
        }

        let encoded = Arc::new(encoded);
        let handles: Vec<_> = nodes
            .into_iter()
            .zip(buckets)
            .map(|(node, bucket)| {
                let worker = self.worker(node);
                let encoded = encoded.clone();
                (node, tokio::spawn(worker.run(encoded, bucket)))
            })
            .collect();

        let (nodes, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        nodes
            .into_iter()
            .zip(results)
            .map(|(node, result)| match result {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(worker = %node, "❌ Worker task died: {}", e);
                    WorkerReport::failed(node, format!("worker task died: {e}"))
                }
            })
            .collect()
    }

    async fn finish(&self, state: &SharedSuiteState) -> Vec<TeardownFailure> {
        if let Err(e) = self.advance(SuitePhase::AllWorkersDone) {
            tracing::error!("❌ {}", e);
        }
        self.run_global_teardown(state).await
    }

    fn log_summary(&self, report: &RunReport) {
        if report.passed() {
            tracing::info!("🎉 {}", report);
        } else {
            tracing::error!("💥 {}", report);
        }
        for failure in &report.teardown_failures {
            tracing::warn!("🧹 Teardown failure: {}", failure);
        }
    }
}
