//! HttpPlatformClient over a real socket
//!
//! Checks what actually reaches the wire: the correlation header, the bearer
//! credential, the endpoint's path prefix and the asynchronous delete protocol.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use harness::platform::{DeleteOutcome, JobRef, JobState, ResourceRef, ResourceSpec};
use harness::*;

mod common;
use common::server::MISSING_SPACE;
use common::{PlatformServer, TestFixtures};

fn client(server: &PlatformServer) -> HttpPlatformClient {
    let connection = ConnectionConfig {
        api_endpoint: server.endpoint().parse().unwrap(),
        apps_domain: "vcap.me".into(),
        root_namespace: "cf".into(),
        correlation_header: "X-Correlation-ID".into(),
    };
    HttpPlatformClient::new(&connection, Some(TestFixtures::ADMIN_TOKEN.to_string()), Duration::from_secs(5)).unwrap()
}

fn space(id: &str) -> TrackedResource {
    TrackedResource {
        id: id.to_string(),
        kind: ResourceKind::Space,
        name: format!("space-{id}"),
        parent: None,
        ownership: Ownership::Test,
    }
}

#[tokio::test]
async fn test_create_sends_correlation_and_bearer_headers() {
    // Arrange
    let server = PlatformServer::start().await;
    let client = client(&server);
    let correlation = CorrelationTracer::new().new_context();
    let spec = ResourceSpec {
        kind: ResourceKind::Space,
        name: "space-a".into(),
        parent: Some(ResourceRef::new(ResourceKind::Organization, "org-guid")),
    };

    // Act
    let remote = client.create(&spec, &correlation).await.unwrap();

    // Assert
    assert_eq!(remote.id, "space-a-guid");
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/cf/v3/spaces");
    assert_eq!(requests[0].header("x-correlation-id"), Some(correlation.to_string().as_str()));
    let expected_auth = format!("bearer {}", TestFixtures::ADMIN_TOKEN);
    assert_eq!(requests[0].header("authorization"), Some(expected_auth.as_str()));
}

#[tokio::test]
async fn test_accepted_delete_is_a_pending_job() {
    // Arrange
    let server = PlatformServer::start().await;
    let client = client(&server);
    let correlation = CorrelationTracer::new().new_context();

    // Act
    let outcome = client
        .delete(&ResourceRef::new(ResourceKind::Space, "s1"), &correlation)
        .await
        .unwrap();
    let job = match &outcome {
        DeleteOutcome::Pending(job) => job.clone(),
        DeleteOutcome::Deleted => panic!("expected a deletion job"),
    };
    let state = client.job_status(&job, &correlation).await.unwrap();

    // Assert
    assert_eq!(job, JobRef("/cf/v3/jobs/space.delete~s1".into()));
    assert_eq!(state, JobState::Complete);

    let requests = server.requests();
    let paths: Vec<_> = requests.iter().map(|r| (r.method.clone(), r.path.as_str())).collect();
    assert_eq!(
        paths,
        vec![
            (Method::DELETE, "/cf/v3/spaces/s1"),
            (Method::GET, "/cf/v3/jobs/space.delete~s1"),
        ]
    );
    let id = correlation.to_string();
    assert!(requests.iter().all(|r| r.header("x-correlation-id") == Some(id.as_str())));
}

#[tokio::test]
async fn test_not_found_maps_to_platform_not_found() {
    // Arrange
    let server = PlatformServer::start().await;
    let client = client(&server);
    let correlation = CorrelationTracer::new().new_context();

    // Act
    let err = client
        .get(&ResourceRef::new(ResourceKind::Space, MISSING_SPACE), &correlation)
        .await
        .unwrap_err();

    // Assert
    assert!(err.is_not_found(), "{err}");
}

/// Already-removed and job-backed deletions both clean up over HTTP
#[tokio::test]
async fn test_lifecycle_cleanup_over_http() {
    // Arrange
    let server = PlatformServer::start().await;
    let manager = ResourceLifecycleManager::new(Arc::new(client(&server)), TestFixtures::fast_retry());
    let correlation = CorrelationTracer::new().new_context();
    let resources = vec![space("s2"), space(MISSING_SPACE)];

    // Act
    let report = manager.cleanup_all(&resources, &correlation).await;

    // Assert
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.removed.len(), 2);

    let requests = server.requests();
    let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["/cf/v3/spaces/gone", "/cf/v3/spaces/s2", "/cf/v3/jobs/space.delete~s2"]
    );
    let id = correlation.to_string();
    assert!(requests.iter().all(|r| r.header("x-correlation-id") == Some(id.as_str())));
}
