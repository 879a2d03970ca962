//! Local stand-in for the platform's v3 API
//!
//! Serves a minimal space collection under a `/cf` path prefix and records
//! every request it receives, headers included.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

/// Space id the server always reports as missing
pub const MISSING_SPACE: &str = "gone";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<RecordedRequest>>>);

impl Recorder {
    fn record(&self, method: Method, uri: &Uri, headers: HeaderMap) {
        self.0.lock().unwrap().push(RecordedRequest {
            method,
            path: uri.path().to_string(),
            headers,
        });
    }
}

pub struct PlatformServer {
    addr: SocketAddr,
    recorder: Recorder,
}

impl PlatformServer {
    pub async fn start() -> Self {
        let recorder = Recorder::default();
        let router = Router::new()
            .route("/cf/v3/spaces", post(create_space))
            .route("/cf/v3/spaces/:id", get(get_space).delete(delete_space))
            .route("/cf/v3/jobs/:id", get(job_status))
            .with_state(recorder.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, recorder }
    }

    /// API root including the path prefix, without a trailing slash
    pub fn endpoint(&self) -> String {
        format!("http://{}/cf", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorder.0.lock().unwrap().clone()
    }
}

fn not_found(id: &str) -> Response {
    let body = json!({
        "errors": [{ "detail": format!("Space '{id}' not found"), "title": "CF-ResourceNotFound", "code": 10010 }]
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn create_space(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    recorder.record(method, &uri, headers);
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let space = json!({ "guid": format!("{name}-guid"), "name": name });
    (StatusCode::CREATED, Json(space)).into_response()
}

async fn get_space(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    recorder.record(method, &uri, headers);
    if id == MISSING_SPACE {
        return not_found(&id);
    }
    Json(json!({ "guid": id, "name": "space" })).into_response()
}

async fn delete_space(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    recorder.record(method, &uri, headers);
    if id == MISSING_SPACE {
        return not_found(&id);
    }
    let location = format!("/cf/v3/jobs/space.delete~{id}");
    (StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response()
}

async fn job_status(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(_job): Path<String>,
) -> Json<Value> {
    recorder.record(method, &uri, headers);
    Json(json!({ "state": "COMPLETE" }))
}
