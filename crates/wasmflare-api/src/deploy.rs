//! Pages deployment upload.
//!
//! A deployment is one multipart `POST` carrying every artifact of an
//! [`ArtifactSet`]. The target account, project and the scoped credential
//! come from the credential store and are checked before any file is opened
//! or any request is sent.
//!
//! Only the Pages target is implemented. The worker target is part of the
//! interface and always fails with [`FlareError::NotImplemented`].

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::fs::File;
use tracing::{debug, info, instrument, warn};

use crate::client::ApiClient;
use wasmflare_common::{CredentialKey, CredentialStore, FlareError, ProjectConfig, Secret};

/// Kind of deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Static site with a worker script, uploaded as a Pages deployment.
    Pages,
    /// Standalone worker script.
    Worker,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Pages => f.write_str("pages"),
            TargetKind::Worker => f.write_str("worker"),
        }
    }
}

/// Account and project a deployment is created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    /// Platform account identifier.
    pub account_id: String,
    /// Pages project name.
    pub project_name: String,
}

impl DeploymentTarget {
    /// Create a target.
    pub fn new(account_id: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            project_name: project_name.into(),
        }
    }

    /// Read the Pages target and its credential from the store.
    ///
    /// The credential is checked first, then the account id, then the
    /// project name. Empty values count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::Configuration`] naming the first missing value,
    /// or [`FlareError::Store`] if the store cannot be read.
    pub fn pages_from_store(store: &dyn CredentialStore) -> Result<(Self, Secret), FlareError> {
        let token = store
            .get_non_empty(CredentialKey::PagesToken)?
            .ok_or(FlareError::not_configured("pages token"))?;
        let account_id = store
            .get_non_empty(CredentialKey::AccountId)?
            .ok_or(FlareError::not_configured("account id"))?;
        let project_name = store
            .get_non_empty(CredentialKey::Project)?
            .ok_or(FlareError::not_configured("project name"))?;

        Ok((Self::new(account_id, project_name), Secret::from(token)))
    }
}

/// One file of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Multipart field name (the artifact's role).
    pub field: String,
    /// Source file.
    pub path: PathBuf,
}

impl Artifact {
    /// File name sent with the part: the base name of the source path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(OsStr::to_str)
            .map_or_else(|| self.field.clone(), str::to_string)
    }
}

/// Ordered set of files uploaded together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    parts: Vec<Artifact>,
}

impl ArtifactSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.parts.push(Artifact {
            field: field.into(),
            path: path.into(),
        });
        self
    }

    /// The Pages build output: the generated script, then the compiled module.
    pub fn pages(project: &ProjectConfig) -> Self {
        Self::new()
            .with(&project.script_file_name, project.script_path())
            .with(&project.wasm_file_name, project.wasm_path())
    }

    /// Parts in upload order.
    pub fn parts(&self) -> &[Artifact] {
        &self.parts
    }

    /// Returns `true` if the set has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Result of a successful deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deployment {
    /// Deployment identifier, if reported.
    pub id: Option<String>,

    /// Public URL of the deployment, if reported.
    pub url: Option<String>,
}

impl Deployment {
    /// Read the reporting fields from a successful deploy `result`.
    ///
    /// The deployment already exists once the envelope reports success, so
    /// an unexpected payload shape never fails the call: fields that are not
    /// strings are ignored.
    pub fn from_result(result: &Value) -> Self {
        let Some(fields) = result.as_object() else {
            if !result.is_null() {
                warn!(kind = json_kind(result), "Unexpected deployment result; ignoring it");
            }
            return Self::default();
        };

        let string_field = |name: &str| match fields.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value.clone()),
            Some(other) => {
                warn!(field = name, kind = json_kind(other), "Deployment field is not a string; ignoring it");
                None
            }
        };

        Self {
            id: string_field("id"),
            url: string_field("url"),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Uploads artifact sets as deployments.
#[derive(Debug, Clone)]
pub struct DeploymentUploader {
    client: ApiClient,
}

impl DeploymentUploader {
    /// Create an uploader.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Deploy to a target of the given kind, reading target and credential
    /// from the store.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::NotImplemented`] for [`TargetKind::Worker`]
    /// without touching the store or the network. For Pages, returns the
    /// configuration, artifact, transport or API error, wrapped with the
    /// operation name.
    pub async fn deploy(
        &self,
        store: &dyn CredentialStore,
        kind: TargetKind,
        artifacts: &ArtifactSet,
    ) -> Result<Deployment, FlareError> {
        match kind {
            TargetKind::Pages => {
                let (target, token) = DeploymentTarget::pages_from_store(store)
                    .map_err(|e| e.in_operation("deploy pages"))?;
                self.deploy_to(&target, &token, artifacts).await
            }
            TargetKind::Worker => Err(FlareError::NotImplemented {
                operation: "worker deployment",
            }
            .in_operation("deploy worker")),
        }
    }

    /// Upload the artifacts as a new Pages deployment of `target`.
    ///
    /// A single request is made; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::ArtifactRead`] if a file cannot be read, or the
    /// transport, API or decode error, wrapped with the operation name.
    #[instrument(skip_all, fields(account_id = %target.account_id, project = %target.project_name))]
    pub async fn deploy_to(
        &self,
        target: &DeploymentTarget,
        token: &Secret,
        artifacts: &ArtifactSet,
    ) -> Result<Deployment, FlareError> {
        self.upload(target, token, artifacts)
            .await
            .map_err(|e| e.in_operation("deploy pages"))
    }

    async fn upload(
        &self,
        target: &DeploymentTarget,
        token: &Secret,
        artifacts: &ArtifactSet,
    ) -> Result<Deployment, FlareError> {
        if artifacts.is_empty() {
            return Err(FlareError::invalid_input("artifacts", "nothing to upload"));
        }

        let mut form = Form::new();
        for artifact in artifacts.parts() {
            let bytes = read_artifact(&artifact.path).await?;
            debug!(
                field = %artifact.field,
                path = %artifact.path.display(),
                size = bytes.len(),
                "Artifact attached"
            );
            let part = Part::bytes(bytes).file_name(artifact.file_name());
            form = form.part(artifact.field.clone(), part);
        }

        info!(parts = artifacts.parts().len(), "Uploading deployment");
        let segments = [
            "accounts",
            target.account_id.as_str(),
            "pages",
            "projects",
            target.project_name.as_str(),
            "deployments",
        ];
        let result = self.client.post_multipart(&segments, token, form).await?;

        let deployment = Deployment::from_result(&result);

        match deployment.url.as_deref() {
            Some(url) if !url.is_empty() => info!(url, "Deployment created"),
            _ => warn!("Deployment created; response carried no URL"),
        }

        Ok(deployment)
    }
}

/// Stream a file into memory. The handle is closed on every exit path.
async fn read_artifact(path: &Path) -> Result<Vec<u8>, FlareError> {
    let read_err = |source| FlareError::ArtifactRead {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(read_err)?;
    let mut bytes = Vec::new();
    tokio::io::copy(&mut file, &mut bytes).await.map_err(read_err)?;
    Ok(bytes)
}
