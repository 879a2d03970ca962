//! HTTP client for the platform's v3 REST API
//!
//! Thin transport over reqwest: builds an [`ApiRequest`], lets the tracer
//! stamp the correlation header, then maps status codes onto
//! [`PlatformError`] so the lifecycle manager can decide what to retry.

use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use shared::correlated_debug;
use url::Url;

use super::{
    ApiRequest, DeleteOutcome, JobRef, JobState, PlatformClient, PlatformError, PlatformResult,
    RemoteResource, ResourceKind, ResourceRef, ResourceSpec,
};
use crate::config::ConnectionConfig;
use crate::tracer::{CorrelationContext, CorrelationTracer};

/// Platform API client backed by reqwest
#[derive(Clone)]
pub struct HttpPlatformClient {
    base_url: Url,
    client: Client,
    token: Option<String>,
    tracer: CorrelationTracer,
}

struct ApiResponse {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

impl HttpPlatformClient {
    /// Create a client for the configured endpoint
    pub fn new(connection: &ConnectionConfig, token: Option<String>, timeout: Duration) -> PlatformResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::InvalidResponse {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: api_root(&connection.api_endpoint),
            client,
            token,
            tracer: CorrelationTracer::with_header(connection.correlation_header.clone()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, path: &str) -> PlatformResult<Url> {
        // Job locations come back absolute; resource paths are relative to the root
        self.base_url
            .join(path)
            .map_err(|e| PlatformError::InvalidResponse {
                message: format!("cannot resolve '{path}' against {}: {e}", self.base_url),
            })
    }

    async fn execute(&self, mut request: ApiRequest, correlation: &CorrelationContext) -> PlatformResult<ApiResponse> {
        if let Some(token) = &self.token {
            request
                .headers
                .insert("Authorization".to_string(), format!("bearer {token}"));
        }
        self.tracer.attach(correlation, &mut request);

        let url = self.resolve(&request.path)?;
        correlated_debug!(correlation, "➡️ {} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(map_transport_error)?;

        correlated_debug!(correlation, "⬅️ {}", status);
        Ok(ApiResponse {
            status,
            location,
            body,
        })
    }
}

#[async_trait::async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn create(&self, spec: &ResourceSpec, correlation: &CorrelationContext) -> PlatformResult<RemoteResource> {
        let request = ApiRequest::new(Method::POST, format!("v3/{}", spec.kind.collection()))
            .with_body(create_body(spec));
        let response = self.execute(request, correlation).await?;

        if !response.status.is_success() {
            return Err(classify_status(
                response.status,
                &response.body,
                &format!("{} '{}'", spec.kind, spec.name),
            ));
        }
        parse_resource(spec.kind, &response.body)
    }

    async fn get(&self, resource: &ResourceRef, correlation: &CorrelationContext) -> PlatformResult<RemoteResource> {
        let request = ApiRequest::new(Method::GET, resource_path(resource));
        let response = self.execute(request, correlation).await?;

        if !response.status.is_success() {
            return Err(classify_status(response.status, &response.body, &resource.to_string()));
        }
        parse_resource(resource.kind, &response.body)
    }

    async fn delete(&self, resource: &ResourceRef, correlation: &CorrelationContext) -> PlatformResult<DeleteOutcome> {
        let request = ApiRequest::new(Method::DELETE, resource_path(resource));
        let response = self.execute(request, correlation).await?;

        match response.status {
            StatusCode::ACCEPTED => match response.location {
                Some(location) => Ok(DeleteOutcome::Pending(JobRef(location))),
                None => Err(PlatformError::InvalidResponse {
                    message: format!("deletion of {resource} accepted without a job location"),
                }),
            },
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            status => Err(classify_status(status, &response.body, &resource.to_string())),
        }
    }

    async fn job_status(&self, job: &JobRef, correlation: &CorrelationContext) -> PlatformResult<JobState> {
        let request = ApiRequest::new(Method::GET, job.0.clone());
        let response = self.execute(request, correlation).await?;

        if !response.status.is_success() {
            return Err(classify_status(response.status, &response.body, &format!("job '{job}'")));
        }
        parse_job_state(&response.body)
    }
}

/// Endpoint with a trailing slash so joins keep any path prefix
fn api_root(endpoint: &Url) -> Url {
    let mut root = endpoint.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root
}

fn resource_path(resource: &ResourceRef) -> String {
    format!("v3/{}/{}", resource.kind.collection(), resource.id)
}

/// Relationship name a child uses to point at its parent
fn parent_relationship(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Organization => None,
        ResourceKind::Space => Some("organization"),
        ResourceKind::ServiceAccount
        | ResourceKind::App
        | ResourceKind::Route
        | ResourceKind::ServiceInstance => Some("space"),
    }
}

fn create_body(spec: &ResourceSpec) -> Value {
    let mut body = json!({ "name": spec.name });
    if let (Some(parent), Some(relationship)) = (&spec.parent, parent_relationship(spec.kind)) {
        body["relationships"] = json!({
            relationship: { "data": { "guid": parent.id } }
        });
    }
    body
}

fn map_transport_error(error: reqwest::Error) -> PlatformError {
    if error.is_decode() {
        PlatformError::InvalidResponse {
            message: error.to_string(),
        }
    } else {
        PlatformError::Transient {
            message: error.to_string(),
        }
    }
}

/// First `errors[].detail` of a v3 error body, or the raw body
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["errors"][0]["detail"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn classify_status(status: StatusCode, body: &str, resource: &str) -> PlatformError {
    match status.as_u16() {
        404 => PlatformError::NotFound {
            resource: resource.to_string(),
        },
        408 | 429 | 500..=599 => PlatformError::Transient {
            message: format!("{status}: {}", error_detail(body)),
        },
        code => PlatformError::Rejected {
            status: code,
            message: error_detail(body),
        },
    }
}

fn parse_resource(kind: ResourceKind, body: &str) -> PlatformResult<RemoteResource> {
    let value: Value = serde_json::from_str(body).map_err(|e| PlatformError::InvalidResponse {
        message: format!("{kind} payload is not JSON: {e}"),
    })?;

    let id = value["guid"]
        .as_str()
        .ok_or_else(|| PlatformError::InvalidResponse {
            message: format!("{kind} payload has no guid"),
        })?;

    Ok(RemoteResource {
        id: id.to_string(),
        kind,
        name: value["name"].as_str().unwrap_or_default().to_string(),
        state: value["state"].as_str().unwrap_or("ready").to_string(),
    })
}

fn parse_job_state(body: &str) -> PlatformResult<JobState> {
    let value: Value = serde_json::from_str(body).map_err(|e| PlatformError::InvalidResponse {
        message: format!("job payload is not JSON: {e}"),
    })?;

    match value["state"].as_str() {
        Some("COMPLETE") => Ok(JobState::Complete),
        Some("FAILED") => Ok(JobState::Failed(error_detail(body))),
        Some("PROCESSING") | Some("POLLING") => Ok(JobState::Processing),
        other => Err(PlatformError::InvalidResponse {
            message: format!("unknown job state {other:?}"),
        }),
    }
}
