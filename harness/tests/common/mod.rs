//! Common test utilities and infrastructure
//!
//! Shared fixtures and helpers used across the harness integration suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;
pub mod server;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{CountingSetup, OrgOnlySetup, TestHelpers};
pub use server::PlatformServer;
