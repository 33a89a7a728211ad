//! Path management
//!
//! All runtime state (settings, database, stored audio) lives under one
//! config directory resolved at startup.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static PATHS: OnceCell<Arc<Paths>> = OnceCell::new();

/// Manages all filesystem paths for the application
#[derive(Debug, Clone)]
pub struct Paths {
    config_dir: PathBuf,
}

impl Paths {
    /// Initialize the paths singleton
    pub fn init(config: Option<PathBuf>) -> Result<Arc<Paths>> {
        let paths = PATHS.get_or_try_init(|| {
            let paths = Self::new(config)?;
            Ok::<_, anyhow::Error>(Arc::new(paths))
        })?;
        Ok(Arc::clone(paths))
    }

    /// Get the global paths instance
    pub fn get() -> Result<Arc<Paths>> {
        PATHS.get().map(Arc::clone).context("Paths not initialized")
    }

    fn new(config_override: Option<PathBuf>) -> Result<Self> {
        let config_parent = if let Some(path) = config_override {
            path
        } else if let Ok(exe) = std::env::current_exe() {
            exe.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            directories::ProjectDirs::from("", "", "soundsink")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        };

        let config_dir_name = if is_home_dir(&config_parent) {
            ".soundsink"
        } else {
            "soundsink"
        };

        let paths = Self {
            config_dir: config_parent.join(config_dir_name),
        };
        paths.create_directories()?;

        Ok(paths)
    }

    fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(self.storage_dir())?;
        Ok(())
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the main database path
    pub fn app_db_path(&self) -> PathBuf {
        self.config_dir.join("soundsink.db")
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Get the default audio storage directory
    pub fn storage_dir(&self) -> PathBuf {
        self.config_dir.join("storage")
    }
}

/// Check if a path is in the user's home directory
fn is_home_dir(path: &Path) -> bool {
    directories::UserDirs::new()
        .map(|dirs| path.starts_with(dirs.home_dir()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_creation() {
        let temp_dir = TempDir::new().unwrap();
        let config = Some(temp_dir.path().to_path_buf());

        // Note: Can't use init() in tests due to OnceCell
        let paths = Paths::new(config).unwrap();

        assert!(paths.config_dir().exists());
        assert!(paths.storage_dir().exists());
        assert!(paths.app_db_path().starts_with(paths.config_dir()));
    }
}
