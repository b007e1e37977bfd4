//! Authenticated request pipeline
//!
//! Every API call of the console goes through [`AuthPipeline`]. Outbound,
//! it attaches the current access token. Inbound, a 401 on a request that
//! has not been replayed yet triggers a token refresh and one replay.
//!
//! Refreshes are single-flight: concurrent requests that all fail with the
//! same expired token wait on one refresh instead of each rotating the
//! token pair themselves.

use super::credentials::CredentialVault;
use super::policy::refresh_failure_ends_session;
use crate::config::AuthConfig;
use crate::navigation::Navigator;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ubm_core::RefreshFailurePolicy;
use ubm_http::client::{decode_json, ensure_success};
use ubm_http::{ApiClient, ClientError};

/// A request as the pipeline sees it
///
/// Kept as plain parts rather than a `reqwest` builder so it can be sent a
/// second time. `retried` is set the first time this request is replayed
/// after a refresh; a replayed request that fails again is not refreshed
/// for a second time.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<JsonValue>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this request has already been replayed after a refresh
    pub const fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Sends API requests with the session's bearer token
pub struct AuthPipeline {
    client: ApiClient,
    vault: Arc<CredentialVault>,
    navigator: Arc<dyn Navigator>,
    policy: RefreshFailurePolicy,
    refresh_lock: Mutex<()>,
    refresh_attempts: AtomicU64,
}

impl AuthPipeline {
    pub fn new(
        client: ApiClient,
        vault: Arc<CredentialVault>,
        navigator: Arc<dyn Navigator>,
        policy: RefreshFailurePolicy,
    ) -> Self {
        Self {
            client,
            vault,
            navigator,
            policy,
            refresh_lock: Mutex::new(()),
            refresh_attempts: AtomicU64::new(0),
        }
    }

    /// The unauthenticated client underneath
    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    pub const fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    pub const fn policy(&self) -> RefreshFailurePolicy {
        self.policy
    }

    /// Refresh requests sent so far, successful or not
    pub fn refresh_attempts(&self) -> u64 {
        self.refresh_attempts.load(Ordering::Relaxed)
    }

    fn build(&self, request: &ApiRequest, token: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(request.method.clone(), &request.path);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    /// Send `request`, refreshing and replaying once on a 401
    pub async fn send(&self, mut request: ApiRequest) -> Result<reqwest::Response, ClientError> {
        loop {
            let token = self.vault.access_token();
            let response = self.build(&request, token.as_deref()).send().await?;
            let status = response.status();

            let failure = match ensure_success(response).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if status != StatusCode::UNAUTHORIZED || request.retried {
                return Err(failure);
            }
            if self.vault.refresh_token().is_none() {
                debug!(path = %request.path, "Unauthorized and no refresh token held");
                return Err(failure);
            }

            request.retried = true;
            debug!(method = %request.method, path = %request.path, "Access token rejected, refreshing");

            if let Err(err) = self.refresh_credentials(token.as_deref()).await {
                self.handle_refresh_failure(&err);
                return Err(err);
            }
        }
    }

    /// Send `request` and decode a JSON success body
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        decode_json(response).await
    }

    /// Send `request` and discard the success body
    pub async fn execute_unit(&self, request: ApiRequest) -> Result<(), ClientError> {
        self.send(request).await.map(drop)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.execute_unit(ApiRequest::delete(path)).await
    }

    /// Rotate the token pair, coalescing with any refresh already running
    ///
    /// `stale_access` is the access token the caller saw rejected. If the
    /// vault holds a different one by the time the refresh lock is acquired,
    /// another task already refreshed and no request is made.
    pub async fn refresh_credentials(&self, stale_access: Option<&str>) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.vault.access_token();
        if current.is_some() && current.as_deref() != stale_access {
            debug!("Access token already rotated by a concurrent refresh");
            return Ok(());
        }

        let Some(refresh_token) = self.vault.refresh_token() else {
            return Err(ClientError::AuthenticationFailed(
                "no refresh token held".to_string(),
            ));
        };

        let generation = self.vault.generation();
        self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
        let tokens = self.client.refresh(&refresh_token).await?;

        if !self.vault.commit_if_current(generation, &tokens) {
            return Err(ClientError::AuthenticationFailed(
                "session ended while refreshing".to_string(),
            ));
        }

        info!("Access token refreshed");
        Ok(())
    }

    fn handle_refresh_failure(&self, error: &ClientError) {
        if refresh_failure_ends_session(self.policy, error) {
            warn!(%error, "Token refresh failed, ending session");
            self.vault.clear();
            self.navigator.redirect(AuthConfig::LOGIN_PATH);
        } else {
            warn!(%error, "Token refresh failed transiently, keeping session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parts() {
        let request = ApiRequest::put("/api/devices/3")
            .json(&serde_json::json!({"name": "gateway"}))
            .unwrap();

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.path(), "/api/devices/3");
        assert!(!request.is_retried());
        assert_eq!(request.body, Some(serde_json::json!({"name": "gateway"})));
    }
}
