//! Platform REST API client for wasmflare.
//!
//! This crate talks to the platform's REST API:
//! - [`envelope`]: Decoding of the success/error/result response wrapper
//! - [`ApiClient`]: Single-attempt authenticated transport
//! - [`PermissionResolver`]: Permission group lookup by name markers
//! - [`TokenScoper`]: Scoped credential creation and persistence
//! - [`DeploymentUploader`]: Multipart Pages deployment upload
//!
//! # Example
//!
//! ```ignore
//! use wasmflare_api::{ApiClient, SetupRequest, TokenScoper};
//! use wasmflare_common::{ApiConfig, MemoryStore};
//!
//! let config = ApiConfig::default();
//! let scoper = TokenScoper::new(ApiClient::new(&config)?, &config);
//! let store = MemoryStore::new();
//!
//! let request = SetupRequest::new("account-id", bootstrap_token, "my-site");
//! request.validate()?;
//! scoper.setup(&store, &request).await?;
//! ```

pub mod client;
pub mod deploy;
pub mod envelope;
pub mod permissions;
pub mod token;

pub use client::ApiClient;
pub use deploy::{Artifact, ArtifactSet, Deployment, DeploymentTarget, DeploymentUploader, TargetKind};
pub use envelope::{ApiEnvelope, ApiMessage};
pub use permissions::{PermissionGroup, PermissionMatcher, PermissionResolver};
pub use token::{SetupRequest, TokenScoper, is_pages_configured, is_worker_configured};
