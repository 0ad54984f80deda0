//! Scoped credential issuance.
//!
//! [`TokenScoper::setup`] trades a broad bootstrap credential for a narrow
//! one bound to a single permission group and a single account, then stores
//! the account id, the new credential and the project name.
//!
//! Setup is not transactional. A failure while persisting leaves whatever
//! was written before it; running setup again overwrites all three keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::ApiClient;
use crate::envelope;
use crate::permissions::{PermissionMatcher, PermissionResolver};
use wasmflare_common::{ApiConfig, CredentialKey, CredentialStore, FlareError, Secret};

/// Token creation endpoint, relative to the API base URL.
const TOKENS_PATH: [&str; 2] = ["user", "tokens"];

/// Resource key binding a policy to one account.
pub const ACCOUNT_RESOURCE_KEY: &str = "com.cloudflare.api.account";

/// Minimum plausible bootstrap token length.
pub const MIN_BOOTSTRAP_TOKEN_LEN: usize = 20;

/// Operator input for [`TokenScoper::setup`].
#[derive(Debug, Clone)]
pub struct SetupRequest {
    /// Account the scoped credential is bound to.
    pub account_id: String,

    /// Broad credential used once to create the scoped one. Never stored.
    pub bootstrap_token: Secret,

    /// Pages project deployments will target.
    pub project_name: String,
}

impl SetupRequest {
    /// Create a setup request.
    pub fn new(
        account_id: impl Into<String>,
        bootstrap_token: impl Into<Secret>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            bootstrap_token: bootstrap_token.into(),
            project_name: project_name.into(),
        }
    }

    /// Reject obviously unusable input before any request is made.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::InvalidInput`] naming the first rejected field.
    pub fn validate(&self) -> Result<(), FlareError> {
        if self.account_id.trim().is_empty() {
            return Err(FlareError::invalid_input("account id", "cannot be empty"));
        }
        if self.bootstrap_token.len() < MIN_BOOTSTRAP_TOKEN_LEN {
            return Err(FlareError::invalid_input("bootstrap token", "token looks too short"));
        }
        if self.project_name.trim().is_empty() {
            return Err(FlareError::invalid_input("project name", "cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CreateTokenRequest<'a> {
    name: &'a str,
    policies: Vec<TokenPolicy<'a>>,
}

#[derive(Debug, Serialize)]
struct TokenPolicy<'a> {
    effect: &'static str,
    permission_groups: Vec<PermissionGroupRef<'a>>,
    resources: BTreeMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
struct PermissionGroupRef<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedToken {
    #[serde(default)]
    value: Option<String>,
}

impl<'a> CreateTokenRequest<'a> {
    /// A single allow policy: one group, one account.
    fn scoped(name: &'a str, group_id: &'a str, account_id: &'a str) -> Self {
        Self {
            name,
            policies: vec![TokenPolicy {
                effect: "allow",
                permission_groups: vec![PermissionGroupRef { id: group_id }],
                resources: BTreeMap::from([(ACCOUNT_RESOURCE_KEY, account_id)]),
            }],
        }
    }
}

/// Creates and stores scoped deployment credentials.
#[derive(Debug, Clone)]
pub struct TokenScoper {
    client: ApiClient,
    resolver: PermissionResolver,
    token_name: String,
}

impl TokenScoper {
    /// Create a scoper using the configured token name and permission markers.
    pub fn new(client: ApiClient, config: &ApiConfig) -> Self {
        let resolver = PermissionResolver::new(client.clone(), PermissionMatcher::from_config(config));
        Self {
            client,
            resolver,
            token_name: config.token_name.clone(),
        }
    }

    /// Resolve the permission group, create the scoped credential and persist
    /// account id, credential and project name, in that order.
    ///
    /// Any failure aborts the remaining steps. Nothing is retried and
    /// nothing already stored is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error wrapped with its operation name.
    #[instrument(skip_all, fields(account_id = %request.account_id, project = %request.project_name))]
    pub async fn setup(
        &self,
        store: &dyn CredentialStore,
        request: &SetupRequest,
    ) -> Result<(), FlareError> {
        let group_id = self
            .resolver
            .resolve(&request.bootstrap_token)
            .await
            .map_err(|e| e.in_operation("resolve permission group"))?;

        info!("Creating scoped Pages token");
        let scoped = self
            .create_token(&request.bootstrap_token, &group_id, &request.account_id)
            .await
            .map_err(|e| e.in_operation("create scoped token"))?;

        persist(store, CredentialKey::AccountId, &request.account_id)?;
        persist(store, CredentialKey::PagesToken, scoped.expose())?;
        persist(store, CredentialKey::Project, &request.project_name)?;

        info!("Setup complete");
        Ok(())
    }

    /// Create a credential granting exactly one permission group on exactly
    /// one account.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::TokenCreationFailed`] if the response carries no
    /// credential value, or the underlying request error.
    pub async fn create_token(
        &self,
        bootstrap: &Secret,
        group_id: &str,
        account_id: &str,
    ) -> Result<Secret, FlareError> {
        let body = CreateTokenRequest::scoped(&self.token_name, group_id, account_id);
        let result = self.client.post_json(&TOKENS_PATH, bootstrap, &body).await?;

        let created: Option<CreatedToken> = envelope::decode_result(result, "created token")?;
        created
            .and_then(|token| token.value)
            .filter(|value| !value.is_empty())
            .map(Secret::from)
            .ok_or(FlareError::TokenCreationFailed)
    }
}

fn persist(store: &dyn CredentialStore, key: CredentialKey, value: &str) -> Result<(), FlareError> {
    store
        .set(key, value)
        .map_err(|source| FlareError::Persist {
            key: key.as_str(),
            source,
        })
        .map_err(|e| e.in_operation("persist credentials"))
}

/// Returns `true` if a non-empty scoped Pages credential is stored.
///
/// # Errors
///
/// Returns [`FlareError::Store`] if the store cannot be read.
pub fn is_pages_configured(store: &dyn CredentialStore) -> Result<bool, FlareError> {
    Ok(store.get_non_empty(CredentialKey::PagesToken)?.is_some())
}

/// Returns `true` if a non-empty worker credential is stored.
///
/// # Errors
///
/// Returns [`FlareError::Store`] if the store cannot be read.
pub fn is_worker_configured(store: &dyn CredentialStore) -> Result<bool, FlareError> {
    Ok(store.get_non_empty(CredentialKey::WorkerToken)?.is_some())
}
