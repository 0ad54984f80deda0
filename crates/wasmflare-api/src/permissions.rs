//! Permission group resolution.
//!
//! The platform publishes a catalog of permission groups. A scoped token is
//! granted exactly one of them, picked by name: the first group whose name
//! contains both the capability marker and the action marker.
//!
//! Matching is literal and case-sensitive. There is no scoring: catalog
//! order decides between several candidates.

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::client::ApiClient;
use crate::envelope;
use wasmflare_common::{ApiConfig, FlareError, Secret};

/// Catalog endpoint, relative to the API base URL.
const CATALOG_PATH: [&str; 3] = ["user", "tokens", "permission_groups"];

/// An entry of the platform's permission group catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionGroup {
    /// Group identifier, referenced by token policies.
    pub id: String,

    /// Human-readable group name.
    pub name: String,
}

/// Dual-substring matcher over permission group names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatcher {
    capability: String,
    action: String,
}

impl PermissionMatcher {
    /// Create a matcher from a capability marker and an action marker.
    pub fn new(capability: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            action: action.into(),
        }
    }

    /// Matcher built from the configured markers.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(&config.capability_marker, &config.action_marker)
    }

    /// Returns `true` if the group name contains both markers.
    pub fn matches(&self, group: &PermissionGroup) -> bool {
        group.name.contains(&self.capability) && group.name.contains(&self.action)
    }

    /// Select the first matching group in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::PermissionNotFound`] if no group matches.
    pub fn select<'a>(&self, catalog: &'a [PermissionGroup]) -> Result<&'a PermissionGroup, FlareError> {
        catalog
            .iter()
            .find(|group| self.matches(group))
            .ok_or_else(|| FlareError::PermissionNotFound {
                capability: self.capability.clone(),
                action: self.action.clone(),
            })
    }
}

/// Resolves the permission group id a scoped token should be granted.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    client: ApiClient,
    matcher: PermissionMatcher,
}

impl PermissionResolver {
    /// Create a resolver using the given client and matcher.
    pub fn new(client: ApiClient, matcher: PermissionMatcher) -> Self {
        Self { client, matcher }
    }

    /// The matcher in use.
    pub fn matcher(&self) -> &PermissionMatcher {
        &self.matcher
    }

    /// Fetch the full permission group catalog.
    ///
    /// # Errors
    ///
    /// Returns transport, API or decode errors.
    pub async fn fetch_catalog(&self, bootstrap: &Secret) -> Result<Vec<PermissionGroup>, FlareError> {
        let result = self.client.get(&CATALOG_PATH, bootstrap).await?;
        let catalog: Vec<PermissionGroup> = envelope::decode_result(result, "permission groups")?;
        debug!(groups = catalog.len(), "Permission catalog fetched");
        Ok(catalog)
    }

    /// Fetch the catalog and return the id of the first matching group.
    ///
    /// # Errors
    ///
    /// Returns [`FlareError::PermissionNotFound`] if nothing matches, or the
    /// underlying fetch error.
    #[instrument(skip_all)]
    pub async fn resolve(&self, bootstrap: &Secret) -> Result<String, FlareError> {
        info!("Fetching permission groups");
        let catalog = self.fetch_catalog(bootstrap).await?;
        let group = self.matcher.select(&catalog)?;
        info!(group_id = %group.id, group_name = %group.name, "Permission group selected");
        Ok(group.id.clone())
    }
}
