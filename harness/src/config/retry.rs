//! Retry Policy
//!
//! Bounded exponential backoff for platform operations against eventually
//! consistent infrastructure.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed (0.0 disables jitter)
    pub jitter: f64,
    /// Total time a single resource operation may take, polling included
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
            deadline: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Policy without jitter, handy for deterministic tests
    pub fn fixed(interval: Duration, deadline: Duration) -> Self {
        Self {
            initial_backoff: interval,
            max_backoff: interval,
            multiplier: 1.0,
            jitter: 0.0,
            deadline,
        }
    }

    /// Delay to wait after the given zero-based attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter.min(1.0);
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }
}
