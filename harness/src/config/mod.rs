//! Configuration Management
//!
//! This module provides the suite configuration, its builder and the retry
//! policy applied to platform operations.

pub mod builder;
pub mod retry;
pub mod suite;

// Re-export main types
pub use builder::SuiteConfigBuilder;
pub use retry::RetryPolicy;
pub use suite::{ConnectionConfig, SuiteConfig};
