//! Shared types for the suite orchestration workspace
//!
//! Contains the identifiers, error type and logging plumbing that every
//! node of a distributed run (leader and workers) agrees on.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;

pub use logging::{DiagnosticEvent, DiagnosticLayer, DiagnosticLog, DiagnosticQuery};
