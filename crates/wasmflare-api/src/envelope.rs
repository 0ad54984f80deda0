//! Response envelope decoding.
//!
//! Every platform response wraps its payload in the same envelope:
//!
//! ```json
//! { "success": true, "errors": [], "result": { ... } }
//! ```
//!
//! [`decode`] turns raw response bytes into the opaque `result` payload, or
//! into the first reported error. It has no side effects and makes exactly
//! one attempt per response.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use wasmflare_common::FlareError;

/// Message used when a failed envelope carries no error detail.
pub const UNSPECIFIED_FAILURE: &str = "unspecified failure";

/// The platform's generic success/error wrapper.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    /// Whether the request succeeded.
    pub success: bool,

    /// Reported errors, in platform order.
    #[serde(default)]
    pub errors: Option<Vec<ApiMessage>>,

    /// Operation-specific payload.
    #[serde(default)]
    pub result: Value,
}

/// A single error entry in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    /// Platform error code.
    #[serde(default)]
    pub code: i64,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl ApiEnvelope {
    /// Return the payload on success, or the first reported error.
    ///
    /// A failed envelope without error entries still fails, with code 0 and
    /// [`UNSPECIFIED_FAILURE`].
    pub fn into_result(self) -> Result<Value, FlareError> {
        if self.success {
            return Ok(self.result);
        }

        match self.errors.unwrap_or_default().into_iter().next() {
            Some(first) => Err(FlareError::api(first.code, first.message)),
            None => Err(FlareError::api(0, UNSPECIFIED_FAILURE)),
        }
    }
}

/// Decode raw response bytes into the envelope's `result` payload.
///
/// # Errors
///
/// Returns [`FlareError::Decode`] if the bytes are not an envelope, and
/// [`FlareError::Api`] if the envelope reports failure.
pub fn decode(bytes: &[u8]) -> Result<Value, FlareError> {
    let envelope: ApiEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| FlareError::decode(format!("parse envelope: {e}")))?;
    envelope.into_result()
}

/// Decode an envelope payload into a concrete type.
///
/// # Errors
///
/// Returns [`FlareError::Decode`] if the payload does not have the expected shape.
pub fn decode_result<T: DeserializeOwned>(result: Value, what: &str) -> Result<T, FlareError> {
    serde_json::from_value(result).map_err(|e| FlareError::decode(format!("parse {what}: {e}")))
}
