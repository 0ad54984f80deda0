//! In-process mock of the platform REST API.
//!
//! Every request is recorded; responses are looked up by method and path
//! (relative to `/client/v4`). Unrouted requests get a failed envelope.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;

use wasmflare_common::{CredentialKey, CredentialStore, MemoryStore, StoreError};

const API_PREFIX: &str = "/client/v4";

/// A request received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(Method, String), (StatusCode, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Running mock API server.
pub struct MockApi {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl MockApi {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock API");
        let addr = listener.local_addr().expect("mock API address");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Base URL to configure the client with.
    pub fn base_url(&self) -> String {
        format!("http://{}{API_PREFIX}", self.addr)
    }

    /// Answer `method path` with a JSON body and status 200.
    pub fn respond(&self, method: Method, path: &str, body: serde_json::Value) {
        self.respond_raw(method, path, StatusCode::OK, &body.to_string());
    }

    /// Answer `method path` with an arbitrary status and body.
    pub fn respond_raw(&self, method: Method, path: &str, status: StatusCode, body: &str) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), (status, body.to_string()));
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of requests received for `method path`.
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| &r.method == method && r.path == path)
            .count()
    }

    /// Stop the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path()
        .strip_prefix(API_PREFIX)
        .unwrap_or(uri.path())
        .to_string();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        headers,
        body,
    });

    let route = state.routes.lock().unwrap().get(&(method, path)).cloned();
    let (status, body) = route.unwrap_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            r#"{"success":false,"errors":[{"code":7003,"message":"No route for that URI"}],"result":null}"#
                .to_string(),
        )
    });

    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Envelope helpers.
pub fn ok(result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"success": true, "errors": [], "messages": [], "result": result})
}

pub fn failed(code: i64, message: &str) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "errors": [{"code": code, "message": message}],
        "messages": [],
        "result": null
    })
}

/// Store whose `set` starts failing after a number of successful writes.
pub struct FailingStore {
    inner: MemoryStore,
    allowed_writes: usize,
    writes: Mutex<usize>,
}

impl FailingStore {
    pub fn failing_after(allowed_writes: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            allowed_writes,
            writes: Mutex::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl CredentialStore for FailingStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        let mut writes = self.writes.lock().unwrap();
        if *writes >= self.allowed_writes {
            return Err(StoreError::Unavailable {
                reason: "disk full".into(),
            });
        }
        *writes += 1;
        self.inner.set(key, value)
    }
}
