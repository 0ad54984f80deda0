//! Platform REST API transport.
//!
//! [`ApiClient`] issues single-attempt requests against the platform API and
//! decodes every response through the envelope decoder. There is no retry
//! and no backoff: a transport failure is reported as-is.

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::envelope;
use wasmflare_common::{ApiConfig, FlareError, Secret};

/// HTTP client for the platform API.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    /// HTTP client (shared, connection pooled).
    client: Client,

    /// Base URL every endpoint path is appended to.
    base_url: Url,
}

impl ApiClient {
    /// Create a client from API configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: &ApiConfig) -> Result<Self, FlareError> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("wasmflare/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FlareError::transport(config.base_url.clone(), e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Build the URL of an endpoint from path segments.
    ///
    /// Each segment is percent-encoded, so identifiers containing `/` stay
    /// within one segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `GET` an endpoint and decode the envelope.
    #[instrument(skip_all, fields(path = %segments.join("/")))]
    pub async fn get(&self, segments: &[&str], token: &Secret) -> Result<Value, FlareError> {
        let url = self.endpoint(segments);
        let request = self
            .client
            .get(url.clone())
            .bearer_auth(token.expose())
            .header(CONTENT_TYPE, "application/json");

        self.send(request, &url).await
    }

    /// `POST` a JSON body to an endpoint and decode the envelope.
    #[instrument(skip_all, fields(path = %segments.join("/")))]
    pub async fn post_json<T>(
        &self,
        segments: &[&str],
        token: &Secret,
        body: &T,
    ) -> Result<Value, FlareError>
    where
        T: Serialize + ?Sized,
    {
        let url = self.endpoint(segments);
        let request = self
            .client
            .post(url.clone())
            .bearer_auth(token.expose())
            .json(body);

        self.send(request, &url).await
    }

    /// `POST` a multipart body to an endpoint and decode the envelope.
    ///
    /// The content type carries the form's boundary.
    #[instrument(skip_all, fields(path = %segments.join("/")))]
    pub async fn post_multipart(
        &self,
        segments: &[&str],
        token: &Secret,
        form: Form,
    ) -> Result<Value, FlareError> {
        let url = self.endpoint(segments);
        let request = self
            .client
            .post(url.clone())
            .bearer_auth(token.expose())
            .multipart(form);

        self.send(request, &url).await
    }

    /// Send a request once, read the whole body and decode it.
    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Value, FlareError> {
        let endpoint = url.path().to_string();

        let response = request
            .send()
            .await
            .map_err(|e| FlareError::transport(&endpoint, describe(&e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FlareError::transport(&endpoint, format!("read response: {e}")))?;

        debug!(
            endpoint = %endpoint,
            status = status.as_u16(),
            body_size = body.len(),
            "API response received"
        );

        envelope::decode(&body).inspect_err(|e| {
            if matches!(e, FlareError::Decode { .. }) {
                warn!(endpoint = %endpoint, status = status.as_u16(), "Response is not an API envelope");
            }
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Parse and check an API base URL.
fn parse_base_url(base_url: &str) -> Result<Url, FlareError> {
    let url = Url::parse(base_url)
        .map_err(|e| FlareError::invalid_input("API base URL", format!("{base_url}: {e}")))?;

    if url.cannot_be_a_base() {
        return Err(FlareError::invalid_input(
            "API base URL",
            format!("{base_url} cannot have endpoint paths appended"),
        ));
    }

    Ok(url)
}

/// Describe a transport failure without echoing request headers.
fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ApiConfig::default().with_base_url(base)).unwrap()
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let api = client("https://api.example.test/client/v4");
        let url = api.endpoint(&["user", "tokens", "permission_groups"]);
        assert_eq!(
            url.as_str(),
            "https://api.example.test/client/v4/user/tokens/permission_groups"
        );
    }

    #[test]
    fn test_endpoint_with_trailing_slash_base() {
        let api = client("https://api.example.test/client/v4/");
        let url = api.endpoint(&["user", "tokens"]);
        assert_eq!(url.as_str(), "https://api.example.test/client/v4/user/tokens");
    }

    #[test]
    fn test_endpoint_encodes_identifiers() {
        let api = client("https://api.example.test/client/v4");
        let url = api.endpoint(&["accounts", "a/b", "pages", "projects", "my site"]);
        assert_eq!(
            url.path(),
            "/client/v4/accounts/a%2Fb/pages/projects/my%20site"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new(&ApiConfig::default().with_base_url("not a url"));
        assert!(matches!(result, Err(FlareError::InvalidInput { .. })));

        let result = ApiClient::new(&ApiConfig::default().with_base_url("mailto:ops@example.test"));
        assert!(matches!(result, Err(FlareError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let api = client("http://127.0.0.1:9/client/v4");
        let result = api.get(&["user", "tokens"], &Secret::new("t")).await;
        assert!(matches!(result, Err(FlareError::Transport { .. })));
    }
}
