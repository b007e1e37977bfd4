//! Request and response bodies of the authentication API

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Login request body
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn bearer() -> String {
    "bearer".to_string()
}

/// Access/refresh token pair issued by the login and refresh endpoints
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Refresh request body
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Password change request body
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

impl fmt::Debug for PasswordChangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChangeRequest { .. }")
    }
}

const fn active() -> bool {
    true
}

/// Profile of the signed-in user, as returned by `GET /api/auth/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Error body returned by the backend on failures
///
/// `detail` is a string for most errors but a list of field errors for
/// request validation failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<JsonValue>,
}

impl ErrorBody {
    /// The human-readable detail, if the server gave one as a string
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(JsonValue::as_str)
            .filter(|detail| !detail.trim().is_empty())
    }
}

/// Informational success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
