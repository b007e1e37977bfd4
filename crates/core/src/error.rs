//! Error type shared by the console crates

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised while loading configuration or preparing local state
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Local state unavailable: {message}")]
    Io { message: String },
}

impl CoreError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::invalid_config(err.to_string())
    }
}
