//! Public authentication endpoints
//!
//! Login and refresh are sent without a bearer header and without any
//! retry logic: a 401 here is a verdict on the submitted credentials.

use super::{ApiClient, ClientError};
use crate::types::{LoginRequest, RefreshRequest, TokenPair};
use reqwest::Method;

/// Exchange a username and password for a token pair
pub const LOGIN_PATH: &str = "/api/auth/login";
/// Exchange a refresh token for a new token pair
pub const REFRESH_PATH: &str = "/api/auth/refresh";
/// Profile of the bearer of the access token
pub const ME_PATH: &str = "/api/auth/me";
/// Change the bearer's password
pub const PASSWORD_PATH: &str = "/api/auth/password";

impl ApiClient {
    /// Authenticate with username and password
    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenPair, ClientError> {
        tracing::debug!(username = %credentials.username, "Sending login request");
        let request = self.request(Method::POST, LOGIN_PATH).json(credentials);
        self.execute(request).await
    }

    /// Rotate the token pair using a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        tracing::debug!("Sending token refresh request");
        let request = self
            .request(Method::POST, REFRESH_PATH)
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            });
        self.execute(request).await
    }
}
