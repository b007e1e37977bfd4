//! Core types shared by the UniFi Backup Manager console crates

pub mod config;
pub mod error;
pub mod logging;
pub mod state_dir;

pub use config::{ApiConfig, AuthSettings, ConsoleConfig, RefreshFailurePolicy, StorageConfig};
pub use error::{CoreError, CoreResult};
pub use state_dir::StateDir;
