//! Harness error types
//!
//! Maps the run's failure taxonomy onto one enum: setup failures are fatal to
//! the run and resource and timeout failures belong to a single test.
//! Diagnostic handler errors are only ever logged. Teardown problems are
//! collected as `TeardownFailure` reports rather than raised.

use std::fmt;
use std::time::Duration;

use shared::SharedError;
use thiserror::Error;

use crate::coordinator::SuitePhase;
use crate::platform::PlatformError;

/// Operation applied to a tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    Create,
    Read,
    Delete,
}

impl fmt::Display for ResourceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceOp::Create => write!(f, "create"),
            ResourceOp::Read => write!(f, "read"),
            ResourceOp::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Suite setup failed: {message}")]
    SetupFailure { message: String },

    #[error("Failed to {operation} {resource}: {source}")]
    ResourceOperation {
        operation: ResourceOp,
        resource: String,
        #[source]
        source: PlatformError,
    },

    #[error("Timed out after {elapsed:?} waiting on {resource} (last observed state: {last_state})")]
    Timeout {
        resource: String,
        last_state: String,
        elapsed: Duration,
    },

    #[error("Diagnostic handler '{handler}' failed: {message}")]
    DiagnosticHandler { handler: String, message: String },

    #[error("Illegal suite phase transition: {from} -> {to}")]
    PhaseTransition { from: SuitePhase, to: SuitePhase },

    #[error("Configuration error: {field}: {message}")]
    Configuration { field: String, message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }

    /// Name of the resource the failure is attributed to, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            HarnessError::ResourceOperation { resource, .. }
            | HarnessError::Timeout { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_names_resource_and_last_state() {
        let error = HarnessError::Timeout {
            resource: "space/stuck-space".to_string(),
            last_state: "PROCESSING".to_string(),
            elapsed: Duration::from_secs(120),
        };

        assert!(error.is_timeout());
        assert_eq!(error.resource(), Some("space/stuck-space"));
        let message = error.to_string();
        assert!(message.contains("stuck-space"));
        assert!(message.contains("PROCESSING"));
    }

    #[test]
    fn test_resource_operation_carries_platform_cause() {
        let error = HarnessError::ResourceOperation {
            operation: ResourceOp::Create,
            resource: "res2".to_string(),
            source: PlatformError::Rejected {
                status: 422,
                message: "space quota exceeded".to_string(),
            },
        };

        assert!(!error.is_timeout());
        assert_eq!(error.resource(), Some("res2"));
        assert!(error.to_string().starts_with("Failed to create res2"));

        let setup = HarnessError::SetupFailure {
            message: "no admin credential configured".to_string(),
        };
        assert_eq!(setup.resource(), None);
    }
}
