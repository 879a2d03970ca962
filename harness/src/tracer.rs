//! Correlation tracing for outbound platform requests
//!
//! Every test case gets a fresh [`CorrelationContext`]; the tracer writes its
//! identifier into one designated header of each request the test issues, so
//! platform-side logs can be joined with harness diagnostics.

use std::fmt;

use shared::CorrelationId;

use crate::platform::ApiRequest;

/// Header used when none is configured
pub const DEFAULT_CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Read-only correlation identity of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationContext {
    id: CorrelationId,
}

impl CorrelationContext {
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl fmt::Display for CorrelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationTracer {
    header: String,
}

impl CorrelationTracer {
    pub fn new() -> Self {
        Self::with_header(DEFAULT_CORRELATION_HEADER)
    }

    pub fn with_header(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Fresh context backed by a random 128-bit identifier
    pub fn new_context(&self) -> CorrelationContext {
        CorrelationContext {
            id: CorrelationId::new(),
        }
    }

    /// Write the context's id into the designated header and nothing else
    pub fn attach(&self, context: &CorrelationContext, request: &mut ApiRequest) {
        request
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case(&self.header));
        request
            .headers
            .insert(self.header.clone(), context.id.to_string());
    }
}

impl Default for CorrelationTracer {
    fn default() -> Self {
        Self::new()
    }
}
