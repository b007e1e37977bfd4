//! Where the console keeps its config file and token file

use crate::CoreResult;
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Resolves where the console keeps durable client-side state
pub struct StateDir {
    project_dirs: Option<ProjectDirs>,
    override_dir: Option<PathBuf>,
}

impl StateDir {
    /// Use the platform's per-user directories
    pub fn new() -> Self {
        let project_dirs = ProjectDirs::from("net", "UniFi Backup Manager", "ubm");
        if project_dirs.is_none() {
            warn!("No home directory found, keeping console state under the working directory");
        }
        Self {
            project_dirs,
            override_dir: None,
        }
    }

    /// Root everything under `path` instead of the platform directories
    pub fn with_override(path: impl Into<PathBuf>) -> Self {
        Self {
            project_dirs: None,
            override_dir: Some(path.into()),
        }
    }

    /// Directory for configuration files
    pub fn config_dir(&self) -> PathBuf {
        if let Some(override_dir) = &self.override_dir {
            return override_dir.join("config");
        }

        self.project_dirs.as_ref().map_or_else(
            || PathBuf::from("./config"),
            |dirs| dirs.config_dir().to_path_buf(),
        )
    }

    /// Directory for persisted session data
    pub fn data_dir(&self) -> PathBuf {
        if let Some(override_dir) = &self.override_dir {
            return override_dir.join("data");
        }

        self.project_dirs.as_ref().map_or_else(
            || PathBuf::from("./data"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    }

    /// Default configuration file location
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("console.toml")
    }

    /// Create the data directory if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created
    pub fn ensure_data_dir(&self) -> CoreResult<PathBuf> {
        let dir = self.data_dir();
        if !dir.exists() {
            debug!("Creating data directory {}", dir.display());
            std::fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }
}

impl Default for StateDir {
    fn default() -> Self {
        Self::new()
    }
}
