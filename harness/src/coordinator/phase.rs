//! Run phase state machine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuitePhase {
    Idle,
    LeaderSetupRunning,
    StateDistributed,
    WorkersRunning,
    AllWorkersDone,
    TeardownRunning,
    Complete,
}

impl SuitePhase {
    /// Legal edges of the run lifecycle
    ///
    /// `Idle -> StateDistributed` is the follower entry: it adopts state it
    /// did not produce. A failed leader setup ends the run directly.
    pub fn can_transition_to(self, next: SuitePhase) -> bool {
        use SuitePhase::*;
        matches!(
            (self, next),
            (Idle, LeaderSetupRunning)
                | (Idle, StateDistributed)
                | (LeaderSetupRunning, StateDistributed)
                | (LeaderSetupRunning, Complete)
                | (StateDistributed, WorkersRunning)
                | (WorkersRunning, AllWorkersDone)
                | (AllWorkersDone, TeardownRunning)
                | (TeardownRunning, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SuitePhase::Complete
    }
}

impl fmt::Display for SuitePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SuitePhase::Idle => "idle",
            SuitePhase::LeaderSetupRunning => "leader_setup_running",
            SuitePhase::StateDistributed => "state_distributed",
            SuitePhase::WorkersRunning => "workers_running",
            SuitePhase::AllWorkersDone => "all_workers_done",
            SuitePhase::TeardownRunning => "teardown_running",
            SuitePhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Current phase plus every phase entered so far
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: SuitePhase,
    history: Vec<(SuitePhase, DateTime<Utc>)>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: SuitePhase::Idle,
            history: vec![(SuitePhase::Idle, Utc::now())],
        }
    }

    pub fn current(&self) -> SuitePhase {
        self.current
    }

    pub fn history(&self) -> &[(SuitePhase, DateTime<Utc>)] {
        &self.history
    }

    pub fn advance(&mut self, next: SuitePhase) -> HarnessResult<()> {
        if !self.current.can_transition_to(next) {
            return Err(HarnessError::PhaseTransition {
                from: self.current,
                to: next,
            });
        }
        tracing::debug!("🔀 Suite phase {} -> {}", self.current, next);
        self.current = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
