//! Suite Coordinator
//!
//! Leader-only global setup, state distribution, the worker loop and
//! leader-only global teardown, plus the phase machine that keeps them in
//! order.

pub mod phase;
pub mod report;
pub mod setup;
pub mod suite;
pub mod worker;

pub use phase::{PhaseTracker, SuitePhase};
pub use report::{RunReport, TeardownFailure, TestOutcome, TestVerdict, WorkerReport};
pub use setup::{Deployer, GlobalSetup, NoopDeployer, SetupContext, StandardSetup};
pub use suite::SuiteCoordinator;
pub use worker::{TestCase, TestContext};
