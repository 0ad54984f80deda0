//! Error types for wasmflare.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`FlareError`]: Errors from credential setup and deployment
//! - [`StoreError`]: Credential store failures
//! - [`ShimError`]: Deployable script generation failures
//! - [`DispatchError`]: Failures of the trigger dispatcher

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from the setup and deployment operations.
///
/// Every failure surfaces immediately; nothing is retried. Operations wrap
/// the underlying failure in [`FlareError::Operation`] so the message names
/// the step that failed, and [`FlareError::root`] recovers the original kind.
#[derive(Error, Debug)]
pub enum FlareError {
    /// A value required from the credential store is missing or empty.
    #[error("{field} not configured")]
    Configuration {
        /// The missing field (account id, credential, or project name).
        field: &'static str,
    },

    /// No permission group name contains both markers.
    #[error("permission group matching '{capability}' and '{action}' not found")]
    PermissionNotFound {
        /// Capability marker (e.g. a product name).
        capability: String,
        /// Action marker (e.g. "Edit").
        action: String,
    },

    /// The platform reported a failure in its response envelope.
    #[error("API error {code}: {message}")]
    Api {
        /// Platform error code (0 when the platform gave none).
        code: i64,
        /// Platform error message.
        message: String,
    },

    /// The response was not a well-formed envelope or payload.
    #[error("malformed response: {reason}")]
    Decode {
        /// Description of the decoding failure.
        reason: String,
    },

    /// A successful token-creation response carried no credential value.
    #[error("token value missing in response")]
    TokenCreationFailed,

    /// An artifact file could not be opened or read.
    #[error("failed to read artifact {}: {source}", .path.display())]
    ArtifactRead {
        /// Path of the unreadable artifact.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing a value to the credential store failed.
    #[error("failed to store {key}: {source}")]
    Persist {
        /// The key being written.
        key: &'static str,
        #[source]
        source: StoreError,
    },

    /// Reading from the credential store failed.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// The request never produced a response (connection, TLS, timeout).
    #[error("request to {endpoint} failed: {reason}")]
    Transport {
        /// The endpoint path that was requested.
        endpoint: String,
        /// Description of the transport failure.
        reason: String,
    },

    /// Operator input was rejected before any request was made.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// The rejected input field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested operation exists in the interface but has no implementation.
    #[error("{operation} is not implemented")]
    NotImplemented {
        /// The unimplemented operation.
        operation: &'static str,
    },

    /// A failure annotated with the operation that produced it.
    #[error("{operation}: {source}")]
    Operation {
        /// Name of the failing operation.
        operation: &'static str,
        #[source]
        source: Box<FlareError>,
    },
}

impl FlareError {
    /// Create a new `Configuration` error.
    pub fn not_configured(field: &'static str) -> Self {
        Self::Configuration { field }
    }

    /// Create a new `Api` error.
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create a new `Decode` error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a new `Transport` error.
    pub fn transport(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidInput` error.
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Wrap this error with the name of the operation that failed.
    #[must_use]
    pub fn in_operation(self, operation: &'static str) -> Self {
        Self::Operation {
            operation,
            source: Box::new(self),
        }
    }

    /// The underlying error, with all operation annotations removed.
    pub fn root(&self) -> &Self {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` if the root cause is a missing configuration value.
    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), Self::Configuration { .. })
    }

    /// Returns `true` if the root cause was reported by the platform.
    pub fn is_api(&self) -> bool {
        matches!(self.root(), Self::Api { .. })
    }
}

/// Credential store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing file could not be read or written.
    #[error("credential file '{}': {source}", .path.display())]
    Io {
        /// Path of the credential file.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file exists but does not hold a JSON string map.
    #[error("credential file '{}' is corrupt: {reason}", .path.display())]
    Corrupt {
        /// Path of the credential file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// The store refused the operation.
    #[error("credential store unavailable: {reason}")]
    Unavailable {
        /// Description of why the store is unavailable.
        reason: String,
    },
}

/// Errors from generating or writing the deployable script.
#[derive(Error, Debug)]
pub enum ShimError {
    /// The host-runtime shim could not be obtained from the compiler side.
    #[error("host runtime shim unavailable: {reason}")]
    HostShimUnavailable {
        /// Description of the failure.
        reason: String,
    },

    /// The generated script could not be written.
    #[error("failed to write generated script {}: {source}", .path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Dispatcher errors.
///
/// These errors occur while loading the module, creating the per-invocation
/// instance, waiting for its readiness signal, or forwarding the trigger.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Loading the binary module failed.
    #[error("module load failed: {reason}")]
    LoadFailed {
        /// Description of the load failure.
        reason: String,
    },

    /// Creating or starting a module instance failed.
    #[error("instantiation failed: {reason}")]
    InstantiationFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The instance went away without ever signalling readiness.
    #[error("instance dropped its readiness signal without signalling ready")]
    ReadinessAbandoned,

    /// The instance did not signal readiness within the configured deadline.
    #[error("instance not ready after {waited_ms}ms")]
    ReadyTimeout {
        /// How long the dispatcher waited, in milliseconds.
        waited_ms: u64,
    },

    /// The ready instance does not export the binding for this trigger.
    #[error("binding '{name}' not exported by instance")]
    MissingBinding {
        /// The binding method name.
        name: String,
    },

    /// The binding call trapped or returned an unusable result.
    #[error("binding '{name}' failed: {message}")]
    Trap {
        /// The binding method name.
        name: String,
        /// Description of the failure.
        message: String,
    },
}

impl DispatchError {
    /// Create a new `LoadFailed` error.
    pub fn load_failed(reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InstantiationFailed` error.
    pub fn instantiation_failed(reason: impl Into<String>) -> Self {
        Self::InstantiationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Trap {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the invocation failed waiting for readiness.
    pub fn is_readiness_failure(&self) -> bool {
        matches!(self, Self::ReadinessAbandoned | Self::ReadyTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlareError::not_configured("account_id");
        assert_eq!(err.to_string(), "account_id not configured");

        let err = FlareError::api(10000, "Authentication error");
        assert_eq!(err.to_string(), "API error 10000: Authentication error");
    }

    #[test]
    fn test_operation_wrapping() {
        let err = FlareError::TokenCreationFailed
            .in_operation("create scoped token")
            .in_operation("cloudflare setup");

        assert_eq!(
            err.to_string(),
            "cloudflare setup: create scoped token: token value missing in response"
        );
        assert!(matches!(err.root(), FlareError::TokenCreationFailed));
    }

    #[test]
    fn test_predicates_see_through_operations() {
        let err = FlareError::not_configured("pages token").in_operation("deploy pages");
        assert!(err.is_configuration());
        assert!(!err.is_api());

        let err = FlareError::api(0, "unspecified failure").in_operation("fetch");
        assert!(err.is_api());
    }

    #[test]
    fn test_store_error_converts() {
        let store_err = StoreError::Unavailable {
            reason: "locked".into(),
        };
        let err: FlareError = store_err.into();
        assert!(matches!(err, FlareError::Store(_)));
    }

    #[test]
    fn test_is_readiness_failure() {
        assert!(DispatchError::ReadinessAbandoned.is_readiness_failure());
        assert!(DispatchError::ReadyTimeout { waited_ms: 5 }.is_readiness_failure());
        assert!(!DispatchError::load_failed("boom").is_readiness_failure());
    }
}
