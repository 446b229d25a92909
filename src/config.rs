use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// How long a cached rule snapshot stays valid
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Pending match-stat updates beyond this are dropped
    #[serde(default = "default_stats_queue_capacity")]
    pub stats_queue_capacity: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("speedy-filter");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("feeds.db").to_string_lossy().to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_stats_queue_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_ttl_seconds: default_cache_ttl(),
            stats_queue_capacity: default_stats_queue_capacity(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.stats_queue_capacity == 0 {
            return Err(AppError::Config(
                "stats_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speedy-filter")
            .join("config.toml")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}
