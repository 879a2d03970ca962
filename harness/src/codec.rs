//! Shared suite state and its wire codec
//!
//! The leader produces one [`SharedSuiteState`] and serializes it once; every
//! worker decodes an identical copy. The payload is a versioned JSON envelope
//! so a worker built from a different revision fails loudly instead of
//! misreading fields.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{RunId, SharedError};

use crate::config::ConnectionConfig;
use crate::error::HarnessResult;
use crate::lifecycle::TrackedResource;
use crate::platform::ResourceKind;

/// Bumped whenever the envelope layout changes
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Result of the one-time global setup, immutable once distributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedSuiteState {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub admin_token: String,
    pub connection: ConnectionConfig,
    /// Pre-provisioned resources, in creation order
    pub shared_resources: Vec<TrackedResource>,
    /// Any other fixture identifiers tests need
    pub fixtures: BTreeMap<String, String>,
}

impl SharedSuiteState {
    pub fn new(run_id: RunId, admin_token: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            admin_token: admin_token.into(),
            connection,
            shared_resources: Vec::new(),
            fixtures: BTreeMap::new(),
        }
    }

    /// First shared resource of the given kind
    pub fn shared(&self, kind: ResourceKind) -> Option<&TrackedResource> {
        self.shared_resources.iter().find(|r| r.kind == kind)
    }

    pub fn shared_org(&self) -> Option<&TrackedResource> {
        self.shared(ResourceKind::Organization)
    }

    pub fn shared_space(&self) -> Option<&TrackedResource> {
        self.shared(ResourceKind::Space)
    }

    pub fn fixture(&self, key: &str) -> Option<&str> {
        self.fixtures.get(key).map(String::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct StateEnvelope {
    version: u32,
    state: SharedSuiteState,
}

pub struct SharedStateCodec;

impl SharedStateCodec {
    /// Serialize state for transmission to workers
    pub fn encode(state: &SharedSuiteState) -> HarnessResult<Vec<u8>> {
        let envelope = StateEnvelope {
            version: STATE_FORMAT_VERSION,
            state: state.clone(),
        };
        serde_json::to_vec(&envelope).map_err(|e| {
            SharedError::SerializationError {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Deserialize state received from the leader
    pub fn decode(bytes: &[u8]) -> HarnessResult<SharedSuiteState> {
        let envelope: StateEnvelope =
            serde_json::from_slice(bytes).map_err(|e| SharedError::DeserializationError {
                message: e.to_string(),
            })?;

        if envelope.version != STATE_FORMAT_VERSION {
            return Err(SharedError::DeserializationError {
                message: format!(
                    "state format version {} does not match expected {}",
                    envelope.version, STATE_FORMAT_VERSION
                ),
            }
            .into());
        }

        Ok(envelope.state)
    }
}
