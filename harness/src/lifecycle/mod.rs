//! Resource Lifecycle Management
//!
//! Creates ephemeral platform resources on behalf of tests and the suite, and
//! guarantees their removal. Test-owned resources live in a [`ResourceScope`]
//! that is drained in reverse creation order; suite-shared resources are
//! removed once, at global teardown.

pub mod manager;
mod poll;
pub mod scope;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::platform::{ResourceKind, ResourceRef};

pub use manager::ResourceLifecycleManager;
pub use scope::{CleanupReport, ResourceScope};

/// Who is responsible for removing a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// Removed by the creating test's cleanup step
    Test,
    /// Created once for the whole run, removed at global teardown
    SuiteShared,
}

/// A platform resource the harness has promised to clean up
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedResource {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub parent: Option<ResourceRef>,
    pub ownership: Ownership,
}

impl TrackedResource {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.id.clone())
    }

    pub fn is_shared(&self) -> bool {
        self.ownership == Ownership::SuiteShared
    }
}

impl fmt::Display for TrackedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.kind, self.name, self.id)
    }
}
