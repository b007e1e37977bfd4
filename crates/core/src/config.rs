//! Layered configuration for the console
//!
//! Values come from built-in defaults, then an optional configuration file,
//! then environment variables prefixed with `UBM` (nested keys are separated
//! by a double underscore, e.g. `UBM_API__BASE_URL`).

use crate::{CoreError, CoreResult, StateDir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the durable token file inside the data directory
pub const TOKEN_FILE_NAME: &str = "tokens.json";

/// Main console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Backend API configuration
    pub api: ApiConfig,

    /// Session behaviour
    pub auth: AuthSettings,

    /// Client-side credential storage
    pub storage: StorageConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Origin of the backup manager API, without the `/api` prefix
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Overrides the default user agent
    pub user_agent: Option<String>,
}

/// What to do with the session when a token refresh fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
    /// Any refresh failure ends the session
    #[default]
    LogoutAlways,
    /// Network-level failures keep the session; rejections still end it
    KeepSessionOnTransient,
}

impl RefreshFailurePolicy {
    /// Whether a refresh failure of the given kind ends the session
    pub const fn ends_session(self, transient: bool) -> bool {
        match self {
            Self::LogoutAlways => true,
            Self::KeepSessionOnTransient => !transient,
        }
    }
}

/// Session behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub refresh_failure: RefreshFailurePolicy,
}

/// Client-side credential storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit token file; defaults to `tokens.json` in the data directory
    pub token_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl ApiConfig {
    /// Request timeout as a duration
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StorageConfig {
    /// Resolve the token file, falling back to the platform data directory
    pub fn token_file_in(&self, state_dir: &StateDir) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| state_dir.data_dir().join(TOKEN_FILE_NAME))
    }
}

impl ConsoleConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default("auth.refresh_failure", "logout_always")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix("UBM").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an http(s) origin or the
    /// timeout is zero
    pub fn validate(&self) -> CoreResult<()> {
        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CoreError::invalid_config(format!(
                "api.base_url must be an http(s) URL, got {base_url:?}"
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(CoreError::invalid_config("api.timeout_secs must be positive"));
        }
        Ok(())
    }
}
