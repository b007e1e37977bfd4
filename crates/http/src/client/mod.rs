//! Backup manager API client

pub mod auth;
pub mod error;

use error::ClientError;
use reqwest::{Client, ClientBuilder, Response, header};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default user agent sent with every request
pub const USER_AGENT: &str = concat!("ubm-console/", env!("CARGO_PKG_VERSION"));

/// Unauthenticated client for the backup manager API
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a request builder without authentication
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Execute a request and decode a JSON success body
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        decode_json(response).await
    }
}

/// Turn a non-2xx response into a [`ClientError`]
pub async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_else(|_| status.to_string());
    Err(ClientError::from_status(status, message))
}

/// Check the status and decode a JSON body
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Paths always start with a slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let mut client_builder = ClientBuilder::new().default_headers(headers);

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder =
            client_builder.user_agent(self.user_agent.unwrap_or_else(|| USER_AGENT.to_string()));

        let client = client_builder.build()?;

        Ok(ApiClient { client, base_url })
    }
}
