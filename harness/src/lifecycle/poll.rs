//! Deadline-bounded retry pacing shared by create and cleanup

use tokio::time::{Instant, sleep_until};

use crate::config::RetryPolicy;
use crate::error::HarnessError;

pub(crate) struct Attempts<'a> {
    policy: &'a RetryPolicy,
    started: Instant,
    deadline: Instant,
    attempt: u32,
}

impl<'a> Attempts<'a> {
    pub(crate) fn new(policy: &'a RetryPolicy) -> Self {
        let started = Instant::now();
        Self {
            policy,
            started,
            deadline: started + policy.deadline,
            attempt: 0,
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Sleep for the next backoff step; false once the deadline has passed
    pub(crate) async fn pause(&mut self) -> bool {
        let wake = (Instant::now() + self.policy.backoff(self.attempt)).min(self.deadline);
        self.attempt = self.attempt.saturating_add(1);
        sleep_until(wake).await;
        Instant::now() < self.deadline
    }

    pub(crate) fn timeout(&self, resource: impl Into<String>, last_state: impl Into<String>) -> HarnessError {
        HarnessError::Timeout {
            resource: resource.into(),
            last_state: last_state.into(),
            elapsed: self.started.elapsed(),
        }
    }
}
