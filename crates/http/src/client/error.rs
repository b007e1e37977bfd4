//! Client error types

use crate::types::ErrorBody;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Credentials missing, expired or rejected (HTTP 401)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code and the raw response body
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::ServerError { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|status| status.as_u16()),
            Self::Serialization(_) | Self::Configuration(_) => None,
        }
    }

    /// The server rejected the bearer credential
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// The failure says nothing about the credential: the server was
    /// unreachable, timed out or failed internally
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Human-readable `detail` supplied by the server, if any
    pub fn detail(&self) -> Option<String> {
        let body = match self {
            Self::BadRequest(body)
            | Self::AuthenticationFailed(body)
            | Self::Forbidden(body)
            | Self::NotFound(body)
            | Self::ServerError { message: body, .. } => body,
            _ => return None,
        };

        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message().map(str::to_owned))
    }
}
