//! Platform API collaborator
//!
//! The core only needs create/read/delete round trips against named resource
//! collections, conventional success/failure signalling and an injectable
//! correlation header. [`PlatformClient`] is that seam; [`HttpPlatformClient`]
//! talks to a live API and [`FakePlatform`] stands in for it in tests.

pub mod fake;
pub mod http;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracer::CorrelationContext;

pub use fake::{FakeOperation, FakePlatform, JournalEntry};
pub use http::HttpPlatformClient;

/// Kinds of platform resources the harness knows how to track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Organization,
    Space,
    ServiceAccount,
    App,
    Route,
    ServiceInstance,
}

impl ResourceKind {
    /// Collection path segment under `/v3`
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Organization => "organizations",
            ResourceKind::Space => "spaces",
            ResourceKind::ServiceAccount => "service_accounts",
            ResourceKind::App => "apps",
            ResourceKind::Route => "routes",
            ResourceKind::ServiceInstance => "service_instances",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Organization => "organization",
            ResourceKind::Space => "space",
            ResourceKind::ServiceAccount => "service_account",
            ResourceKind::App => "app",
            ResourceKind::Route => "route",
            ResourceKind::ServiceInstance => "service_instance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind plus identifier of a platform resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}

/// What to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    pub parent: Option<ResourceRef>,
}

/// Resource as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub state: String,
}

/// Reference to an asynchronous platform job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef(pub String);

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of asking the platform to delete something
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed synchronously
    Deleted,
    /// Accepted; the job must be polled to a terminal state
    Pending(JobRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Processing,
    Complete,
    Failed(String),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Processing => write!(f, "PROCESSING"),
            JobState::Complete => write!(f, "COMPLETE"),
            JobState::Failed(reason) => write!(f, "FAILED ({reason})"),
        }
    }
}

/// Outbound request before it is handed to the HTTP client
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: reqwest::Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: reqwest::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("transient platform error: {message}")]
    Transient { message: String },

    #[error("platform rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid platform response: {message}")]
    InvalidResponse { message: String },

    #[error("platform job {job} failed: {reason}")]
    JobFailed { job: JobRef, reason: String },
}

impl PlatformError {
    /// Network blips and not-yet-consistent reads are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform API abstraction for dependency injection
///
/// Every call carries the correlation context of the test (or suite phase)
/// that issued it.
#[mockall::automock]
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    /// Create a resource, returning the platform's view of it
    async fn create(
        &self,
        spec: &ResourceSpec,
        correlation: &CorrelationContext,
    ) -> PlatformResult<RemoteResource>;

    /// Fetch the current state of a resource
    async fn get(
        &self,
        resource: &ResourceRef,
        correlation: &CorrelationContext,
    ) -> PlatformResult<RemoteResource>;

    /// Request deletion of a resource
    async fn delete(
        &self,
        resource: &ResourceRef,
        correlation: &CorrelationContext,
    ) -> PlatformResult<DeleteOutcome>;

    /// Poll an asynchronous job
    async fn job_status(
        &self,
        job: &JobRef,
        correlation: &CorrelationContext,
    ) -> PlatformResult<JobState>;
}
