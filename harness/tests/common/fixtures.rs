//! Test fixtures and data for harness tests

use std::time::Duration;

use harness::{RetryPolicy, SuiteConfig};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const API_ENDPOINT: &'static str = "https://api.e2e.example.com";
    pub const ADMIN_TOKEN: &'static str = "test-admin-token";

    /// Failure content the platform emits when staging lost its droplet
    pub const DROPLET_NOT_FOUND: &'static str = "Staging error: Droplet not found";
    pub const UNRELATED_FAILURE: &'static str = "expected status 200 but got 503";

    /// Polling interval and deadline used by every lifecycle operation in tests
    pub fn fast_retry() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(10), Duration::from_secs(2))
    }

    /// Deployment skipped, admin token present
    pub fn config(workers: u32) -> SuiteConfig {
        SuiteConfig::builder()
            .api_endpoint(Self::API_ENDPOINT)
            .admin_token(Self::ADMIN_TOKEN)
            .skip_deploy(true)
            .workers(workers)
            .retry(Self::fast_retry())
            .diagnostic_timeout(Duration::from_secs(1))
            .rendezvous_timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    /// Same as [`TestFixtures::config`] but without any admin credential
    pub fn config_without_token(workers: u32) -> SuiteConfig {
        let mut config = Self::config(workers);
        config.admin_token = None;
        config
    }
}
