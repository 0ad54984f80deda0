//! Pages deployment upload against a mock platform API.

mod common;

use axum::http::Method;
use serde_json::json;

use common::{MockApi, failed, ok};
use wasmflare_api::{ApiClient, ArtifactSet, DeploymentTarget, DeploymentUploader, TargetKind};
use wasmflare_common::{ApiConfig, CredentialKey, CredentialStore, FlareError, MemoryStore, ProjectConfig, Secret};

const DEPLOYMENTS: &str = "/accounts/acct-123/pages/projects/my-site/deployments";
const SCRIPT: &str = "export default { fetch() {} };";
const WASM: &[u8] = b"\0asm\x01\0\0\0";

fn uploader(api: &MockApi) -> DeploymentUploader {
    let config = ApiConfig::default().with_base_url(api.base_url());
    DeploymentUploader::new(ApiClient::new(&config).unwrap())
}

fn configured_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.set(CredentialKey::AccountId, "acct-123").unwrap();
    store.set(CredentialKey::PagesToken, "scoped-token").unwrap();
    store.set(CredentialKey::Project, "my-site").unwrap();
    store
}

/// Project rooted in a temp dir with both build outputs written.
fn built_project(dir: &tempfile::TempDir) -> ProjectConfig {
    let project = ProjectConfig {
        app_root_dir: dir.path().display().to_string(),
        ..Default::default()
    };
    std::fs::create_dir_all(project.output_path()).unwrap();
    std::fs::write(project.script_path(), SCRIPT).unwrap();
    std::fs::write(project.wasm_path(), WASM).unwrap();
    project
}

#[tokio::test]
async fn test_deploy_without_credential_makes_no_request() {
    let api = MockApi::start().await;
    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let store = MemoryStore::new();
    store.set(CredentialKey::AccountId, "acct-123").unwrap();
    store.set(CredentialKey::Project, "my-site").unwrap();

    let err = uploader(&api)
        .deploy(&store, TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "deploy pages: pages token not configured");
    assert!(api.requests().is_empty());

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_reports_url_after_single_post() {
    let api = MockApi::start().await;
    api.respond(
        Method::POST,
        DEPLOYMENTS,
        ok(json!({"id": "dep-1", "url": "https://x.pages.dev"})),
    );

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let deployment = uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap();

    assert_eq!(deployment.url.as_deref(), Some("https://x.pages.dev"));
    assert_eq!(deployment.id.as_deref(), Some("dep-1"));

    let requests = api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, DEPLOYMENTS);

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_multipart_body() {
    let api = MockApi::start().await;
    api.respond(Method::POST, DEPLOYMENTS, ok(json!({"url": "https://x.pages.dev"})));

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap();

    let request = &api.requests()[0];
    assert_eq!(request.header("authorization"), Some("Bearer scoped-token"));

    let content_type = request.header("content-type").unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = request.body_text();
    assert!(body.contains(r#"name="_worker.js"; filename="_worker.js""#));
    assert!(body.contains(r#"name="worker.wasm"; filename="worker.wasm""#));
    assert!(body.contains(SCRIPT));
    assert!(body.contains("\0asm"));

    // Script part precedes the module part.
    let script_at = body.find(r#"name="_worker.js""#).unwrap();
    let wasm_at = body.find(r#"name="worker.wasm""#).unwrap();
    assert!(script_at < wasm_at);

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_success_without_url() {
    let api = MockApi::start().await;
    api.respond(Method::POST, DEPLOYMENTS, ok(json!({"id": "dep-2"})));

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let deployment = uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap();

    assert!(deployment.url.is_none());

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_succeeds_with_non_string_id() {
    let api = MockApi::start().await;
    api.respond(
        Method::POST,
        DEPLOYMENTS,
        ok(json!({"id": 42, "url": "https://x.pages.dev"})),
    );

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let deployment = uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap();

    assert_eq!(deployment.url.as_deref(), Some("https://x.pages.dev"));
    assert!(deployment.id.is_none());
    assert_eq!(api.count(&Method::POST, DEPLOYMENTS), 1);

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_succeeds_with_scalar_result() {
    let api = MockApi::start().await;
    api.respond(Method::POST, DEPLOYMENTS, ok(json!("done")));

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let deployment = uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap();

    assert_eq!(deployment, Default::default());
    assert_eq!(api.count(&Method::POST, DEPLOYMENTS), 1);

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_missing_artifact() {
    let api = MockApi::start().await;
    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);
    std::fs::remove_file(project.wasm_path()).unwrap();

    let err = uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap_err();

    match err.root() {
        FlareError::ArtifactRead { path, .. } => assert_eq!(path, &project.wasm_path()),
        other => panic!("expected ArtifactRead, got {other:?}"),
    }
    assert!(api.requests().is_empty());

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_api_failure() {
    let api = MockApi::start().await;
    api.respond(Method::POST, DEPLOYMENTS, failed(8000007, "Project not found"));

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let err = uploader(&api)
        .deploy(&configured_store(), TargetKind::Pages, &ArtifactSet::pages(&project))
        .await
        .unwrap_err();

    assert!(err.is_api());
    assert_eq!(
        err.to_string(),
        "deploy pages: API error 8000007: Project not found"
    );
    assert_eq!(api.count(&Method::POST, DEPLOYMENTS), 1);

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_worker_is_not_implemented() {
    let api = MockApi::start().await;
    let store = MemoryStore::new();
    store.set(CredentialKey::WorkerToken, "worker-token").unwrap();

    let err = uploader(&api)
        .deploy(&store, TargetKind::Worker, &ArtifactSet::new())
        .await
        .unwrap_err();

    assert!(matches!(err.root(), FlareError::NotImplemented { .. }));
    assert!(api.requests().is_empty());

    api.shutdown().await;
}

#[tokio::test]
async fn test_deploy_to_explicit_target() {
    let api = MockApi::start().await;
    api.respond(
        Method::POST,
        "/accounts/other/pages/projects/docs/deployments",
        ok(json!({"url": "https://docs.pages.dev"})),
    );

    let dir = tempfile::tempdir().unwrap();
    let project = built_project(&dir);

    let deployment = uploader(&api)
        .deploy_to(
            &DeploymentTarget::new("other", "docs"),
            &Secret::new("explicit-token"),
            &ArtifactSet::pages(&project),
        )
        .await
        .unwrap();

    assert_eq!(deployment.url.as_deref(), Some("https://docs.pages.dev"));
    assert_eq!(
        api.requests()[0].header("authorization"),
        Some("Bearer explicit-token")
    );

    api.shutdown().await;
}
