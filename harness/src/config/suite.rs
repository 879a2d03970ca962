//! Suite Configuration
//!
//! Values supplied by the environment at run start. The harness treats them
//! as opaque: each is either required or defaulted, nothing more is checked.

use serde::{Deserialize, Serialize};
use shared::DiagnosticLog;
use shared::logging::init_tracing;
use std::time::Duration;
use url::Url;

use super::builder::SuiteConfigBuilder;
use super::retry::RetryPolicy;
use crate::error::HarnessResult;
use crate::tracer::DEFAULT_CORRELATION_HEADER;

pub const ENV_API_SERVER_ROOT: &str = "API_SERVER_ROOT";
pub const ENV_APP_FQDN: &str = "APP_FQDN";
pub const ENV_ROOT_NAMESPACE: &str = "ROOT_NAMESPACE";
pub const ENV_SKIP_DEPLOY: &str = "E2E_SKIP_DEPLOY";
pub const ENV_WORKERS: &str = "E2E_WORKERS";
pub const ENV_ADMIN_TOKEN: &str = "E2E_ADMIN_TOKEN";
pub const ENV_CORRELATION_HEADER: &str = "E2E_CORRELATION_HEADER";
pub const ENV_LOG_LEVEL: &str = "E2E_LOG_LEVEL";

/// Connection details every worker needs to reach the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub api_endpoint: Url,
    pub apps_domain: String,
    pub root_namespace: String,
    pub correlation_header: String,
}

#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub api_endpoint: Url,
    pub apps_domain: String,
    pub root_namespace: String,
    /// Skip the expensive global deployment step
    pub skip_deploy: bool,
    pub workers: u32,
    pub admin_token: Option<String>,
    pub correlation_header: String,
    /// Prefix for names of resources created by the suite
    pub resource_prefix: String,
    pub retry: RetryPolicy,
    /// Per-handler bound on diagnostic collection
    pub diagnostic_timeout: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Bound on how long followers wait for the leader (and vice versa)
    pub rendezvous_timeout: Duration,
    pub log_level: String,
}

impl SuiteConfig {
    pub const DEFAULT_APPS_DOMAIN: &'static str = "vcap.me";
    pub const DEFAULT_ROOT_NAMESPACE: &'static str = "cf";

    /// Create a new builder
    pub fn builder() -> SuiteConfigBuilder {
        SuiteConfigBuilder::new()
    }

    /// Load from process environment, reading `.env` first if present
    pub fn from_env() -> HarnessResult<Self> {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("📄 Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(endpoint) = lookup(ENV_API_SERVER_ROOT) {
            builder = builder.api_endpoint(endpoint);
        }
        if let Some(domain) = lookup(ENV_APP_FQDN) {
            builder = builder.apps_domain(domain);
        }
        if let Some(namespace) = lookup(ENV_ROOT_NAMESPACE) {
            builder = builder.root_namespace(namespace);
        }
        if let Some(skip) = lookup(ENV_SKIP_DEPLOY) {
            builder = builder.skip_deploy(parse_flag(&skip));
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            builder = builder.workers_raw(workers);
        }
        if let Some(token) = lookup(ENV_ADMIN_TOKEN) {
            builder = builder.admin_token(token);
        }
        if let Some(header) = lookup(ENV_CORRELATION_HEADER) {
            builder = builder.correlation_header(header);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            builder = builder.log_level(level);
        }

        builder.build()
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            api_endpoint: self.api_endpoint.clone(),
            apps_domain: self.apps_domain.clone(),
            root_namespace: self.root_namespace.clone(),
            correlation_header: self.correlation_header.clone(),
        }
    }

    /// Install the global subscriber at the configured level
    ///
    /// Events carrying a correlation id are also captured into `diagnostics`.
    pub fn init_logging(&self, diagnostics: Option<&DiagnosticLog>) {
        init_tracing(Some(&self.log_level), diagnostics);
    }

    pub(crate) fn default_with_endpoint(api_endpoint: Url) -> Self {
        Self {
            api_endpoint,
            apps_domain: Self::DEFAULT_APPS_DOMAIN.to_string(),
            root_namespace: Self::DEFAULT_ROOT_NAMESPACE.to_string(),
            skip_deploy: false,
            workers: 1,
            admin_token: None,
            correlation_header: DEFAULT_CORRELATION_HEADER.to_string(),
            resource_prefix: "e2e".to_string(),
            retry: RetryPolicy::default(),
            diagnostic_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            rendezvous_timeout: Duration::from_secs(30 * 60),
            log_level: "info".to_string(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
