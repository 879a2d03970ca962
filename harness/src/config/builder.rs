//! Suite Configuration Builder
//!
//! Provides a flexible builder pattern for constructing suite configurations

use std::time::Duration;
use url::Url;

use super::retry::RetryPolicy;
use super::suite::{ENV_API_SERVER_ROOT, ENV_WORKERS, SuiteConfig};
use crate::error::{HarnessError, HarnessResult};

pub struct SuiteConfigBuilder {
    api_endpoint: Option<String>,
    workers: Option<String>,
    apps_domain: Option<String>,
    root_namespace: Option<String>,
    skip_deploy: bool,
    admin_token: Option<String>,
    correlation_header: Option<String>,
    resource_prefix: Option<String>,
    retry: Option<RetryPolicy>,
    diagnostic_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    rendezvous_timeout: Option<Duration>,
    log_level: Option<String>,
}

impl SuiteConfigBuilder {
    pub fn new() -> Self {
        Self {
            api_endpoint: None,
            workers: None,
            apps_domain: None,
            root_namespace: None,
            skip_deploy: false,
            admin_token: None,
            correlation_header: None,
            resource_prefix: None,
            retry: None,
            diagnostic_timeout: None,
            request_timeout: None,
            rendezvous_timeout: None,
            log_level: None,
        }
    }

    /// Set the platform API root (required)
    pub fn api_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    /// Set the application domain
    pub fn apps_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.apps_domain = Some(domain.into());
        self
    }

    /// Set the root namespace identifier
    pub fn root_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.root_namespace = Some(namespace.into());
        self
    }

    /// Skip the global deployment step
    pub fn skip_deploy(mut self, skip: bool) -> Self {
        self.skip_deploy = skip;
        self
    }

    /// Set number of parallel workers
    pub fn workers(mut self, count: u32) -> Self {
        self.workers = Some(count.to_string());
        self
    }

    pub(crate) fn workers_raw(mut self, count: String) -> Self {
        self.workers = Some(count);
        self
    }

    /// Set the admin credential handed to every worker
    pub fn admin_token<S: Into<String>>(mut self, token: S) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    /// Set the header carrying correlation ids
    pub fn correlation_header<S: Into<String>>(mut self, header: S) -> Self {
        self.correlation_header = Some(header.into());
        self
    }

    /// Set the prefix used when naming suite resources
    pub fn resource_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.resource_prefix = Some(prefix.into());
        self
    }

    /// Set the retry policy for platform operations
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the per-handler diagnostic collection bound
    pub fn diagnostic_timeout(mut self, timeout: Duration) -> Self {
        self.diagnostic_timeout = Some(timeout);
        self
    }

    /// Set the per-request HTTP timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set how long nodes wait on each other through the rendezvous
    pub fn rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = Some(timeout);
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> HarnessResult<SuiteConfig> {
        let raw_endpoint = self.api_endpoint.ok_or_else(|| HarnessError::Configuration {
            field: ENV_API_SERVER_ROOT.to_string(),
            message: "platform API endpoint is required".to_string(),
        })?;
        let api_endpoint = Url::parse(&raw_endpoint).map_err(|e| HarnessError::Configuration {
            field: ENV_API_SERVER_ROOT.to_string(),
            message: format!("'{raw_endpoint}' is not a valid URL: {e}"),
        })?;

        let mut config = SuiteConfig::default_with_endpoint(api_endpoint);

        if let Some(workers) = self.workers {
            config.workers = match workers.trim().parse::<u32>() {
                Ok(count) if count > 0 => count,
                _ => {
                    return Err(HarnessError::Configuration {
                        field: ENV_WORKERS.to_string(),
                        message: format!("'{workers}' is not a positive worker count"),
                    });
                }
            };
        }

        if let Some(domain) = self.apps_domain {
            config.apps_domain = domain;
        }
        if let Some(namespace) = self.root_namespace {
            config.root_namespace = namespace;
        }
        config.skip_deploy = self.skip_deploy;
        config.admin_token = self.admin_token;
        if let Some(header) = self.correlation_header {
            config.correlation_header = header;
        }
        if let Some(prefix) = self.resource_prefix {
            config.resource_prefix = prefix;
        }
        if let Some(retry) = self.retry {
            config.retry = retry;
        }
        if let Some(timeout) = self.diagnostic_timeout {
            config.diagnostic_timeout = timeout;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(timeout) = self.rendezvous_timeout {
            config.rendezvous_timeout = timeout;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        Ok(config)
    }
}

impl Default for SuiteConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = SuiteConfigBuilder::new()
            .api_endpoint("http://localhost:8080")
            .workers(3)
            .skip_deploy(true)
            .resource_prefix("smoke")
            .diagnostic_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.workers, 3);
        assert!(config.skip_deploy);
        assert_eq!(config.resource_prefix, "smoke");
        assert_eq!(config.diagnostic_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = SuiteConfigBuilder::new()
            .api_endpoint("http://localhost:8080")
            .workers(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = SuiteConfigBuilder::new().api_endpoint("not a url").build();
        assert!(matches!(result, Err(HarnessError::Configuration { .. })));
    }
}
