//! Failure Hooks
//!
//! Ordered (matcher, handler) pairs consulted when a test fails. Matching is
//! by failure content, and every matching handler runs, since several causes
//! may be implicated at once. Handlers only collect diagnostics, and nothing
//! they do can change the test's outcome.

pub mod handlers;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::lifecycle::TrackedResource;
use crate::platform::PlatformClient;
use crate::tracer::CorrelationContext;

pub use handlers::{CorrelationReplayHandler, DiagnosticHandler, FnHandler, ResourceSnapshotHandler};
pub use registry::{DispatchPolicy, DispatchReport, FailureHookRegistry, HandlerOutcome, HookEntry};

type Predicate = dyn Fn(&str) -> bool + Send + Sync;

/// Predicate over failure content
#[derive(Clone)]
pub struct Matcher {
    description: String,
    predicate: Arc<Predicate>,
}

impl Matcher {
    /// Matches when the failure message contains `fragment`
    pub fn contains(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        let needle = fragment.clone();
        Self {
            description: format!("contains {fragment:?}"),
            predicate: Arc::new(move |content: &str| content.contains(&needle)),
        }
    }

    /// Matches when the message contains any of the fragments
    pub fn any_of<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let description = format!("contains any of {fragments:?}");
        Self {
            description,
            predicate: Arc::new(move |content: &str| fragments.iter().any(|f| content.contains(f))),
        }
    }

    /// Matches every failure
    pub fn always() -> Self {
        Self::predicate("any failure", |_| true)
    }

    pub fn predicate<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, content: &str) -> bool {
        (self.predicate)(content)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("description", &self.description)
            .finish()
    }
}

/// Everything known about a failed test at the moment it failed
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub test: String,
    pub message: String,
    pub correlation: CorrelationContext,
    /// Resources the test had created and not yet cleaned up
    pub resources: Vec<TrackedResource>,
    /// Connection configuration in effect at failure time
    pub connection: ConnectionConfig,
}

/// Live access handed to diagnostic handlers
#[derive(Clone)]
pub struct DiagnosticContext {
    pub platform: Arc<dyn PlatformClient>,
}

impl DiagnosticContext {
    pub fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self { platform }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_matcher() {
        let matcher = Matcher::contains("Droplet not found");
        assert!(matcher.matches("error: Droplet not found for app x"));
        assert!(!matcher.matches("timeout waiting for route"));
        assert_eq!(matcher.description(), "contains \"Droplet not found\"");
    }

    #[test]
    fn test_any_of_matcher() {
        let matcher = Matcher::any_of(["503", "connection refused"]);
        assert!(matcher.matches("dial tcp: connection refused"));
        assert!(matcher.matches("got status 503"));
        assert!(!matcher.matches("got status 404"));
    }

    #[test]
    fn test_predicate_and_always() {
        let long = Matcher::predicate("longer than 5", |c| c.len() > 5);
        assert!(long.matches("abcdef"));
        assert!(!long.matches("abc"));
        assert!(Matcher::always().matches(""));
    }
}
