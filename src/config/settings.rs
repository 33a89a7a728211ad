//! Service configuration
//!
//! Settings live in settings.json under the config directory. Environment
//! variables override the file on every load so container deployments can
//! reconfigure between restarts without editing state.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::Paths;

static SETTINGS: OnceCell<Arc<RwLock<Settings>>> = OnceCell::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Instance id, doubles as the JWT signing secret
    #[serde(default)]
    pub server_id: String,

    /// Shared job store / pub-sub endpoint
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// SQLite database path override; defaults next to the config dir
    #[serde(default)]
    pub database_path: Option<String>,

    /// Audio blob directory override
    #[serde(default)]
    pub storage_dir: Option<String>,

    /// Number of download workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Retry budget per job
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-job processing deadline in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Upstream catalogue request budget
    #[serde(default = "default_rate_limit")]
    pub musicbrainz_rate_limit_per_second: u32,

    /// Log filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_id: String::new(),
            redis_url: default_redis_url(),
            database_path: None,
            storage_dir: None,
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            job_timeout_secs: default_job_timeout_secs(),
            musicbrainz_rate_limit_per_second: default_rate_limit(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from file, apply env overrides
    pub fn load() -> Result<Self> {
        let paths = Paths::get()?;
        let settings_path = paths.settings_path();

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .context("Failed to read settings file")?;
            serde_json::from_str(&content).context("Failed to parse settings file")?
        } else {
            let settings = Self::default();
            settings.save()?;
            settings
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let paths = Paths::get()?;
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(paths.settings_path(), content).context("Failed to write settings file")?;
        Ok(())
    }

    /// Get the global settings instance
    pub fn global() -> Arc<RwLock<Settings>> {
        SETTINGS
            .get_or_init(|| {
                let settings = Settings::load().unwrap_or_default();
                Arc::new(RwLock::new(settings))
            })
            .clone()
    }

    /// Env vars win over the settings file. This runs on every load so
    /// docker users can change them between restarts.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("SOUNDSINK_REDIS_URL") {
            self.redis_url = value;
        }
        if let Ok(value) = std::env::var("SOUNDSINK_DATABASE_PATH") {
            self.database_path = Some(value);
        }
        if let Ok(value) = std::env::var("SOUNDSINK_STORAGE_DIR") {
            self.storage_dir = Some(value);
        }
        if let Ok(value) = std::env::var("SOUNDSINK_WORKER_COUNT") {
            if let Ok(parsed) = value.parse() {
                self.worker_count = parsed;
            }
        }
        if let Ok(value) = std::env::var("SOUNDSINK_MAX_RETRIES") {
            if let Ok(parsed) = value.parse() {
                self.max_retries = parsed;
            }
        }
        if let Ok(value) = std::env::var("SOUNDSINK_JOB_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse() {
                self.job_timeout_secs = parsed;
            }
        }
        if let Ok(value) = std::env::var("SOUNDSINK_MB_RATE_LIMIT") {
            if let Ok(parsed) = value.parse() {
                self.musicbrainz_rate_limit_per_second = parsed;
            }
        }
        if let Ok(value) = std::env::var("SOUNDSINK_LOG_LEVEL") {
            self.log_level = value;
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

// Default value functions for serde

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_worker_count() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_rate_limit() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}
