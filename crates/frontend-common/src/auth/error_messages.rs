//! User-facing error messages

use crate::config::AuthConfig;
use ubm_http::ClientError;

/// The server's `detail`, or `fallback` when it gave none
pub fn detail_or(error: &ClientError, fallback: &str) -> String {
    error.detail().unwrap_or_else(|| fallback.to_string())
}

/// Message shown under the login form
pub fn login_error_message(error: &ClientError) -> String {
    detail_or(error, AuthConfig::LOGIN_FAILED_MESSAGE)
}

/// Message shown on the settings page after a failed password change
pub fn password_change_error_message(error: &ClientError) -> String {
    detail_or(error, AuthConfig::PASSWORD_CHANGE_FAILED_MESSAGE)
}
