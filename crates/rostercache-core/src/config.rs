//! Cache configuration.
//!
//! Tuning knobs for the roster cache: how long a page stays fresh, page-size
//! bounds, and where the member API lives.
//!
//! Configuration is stored at `~/.config/rostercache/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::{RevalidationPolicy, DEFAULT_STALE_AFTER_SECS};

/// Application name used for the config directory path
const APP_NAME: &str = "rostercache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on page size so a single request stays reasonably small.
const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_API_BASE_URL: &str = "https://api.example.com/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub stale_after_secs: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub api_base_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Negative values are treated as zero (every read revalidates).
    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.stale_after_secs.max(0))
    }

    pub fn policy(&self) -> RevalidationPolicy {
        RevalidationPolicy::new(self.stale_after())
    }

    /// Clamp a requested page size into `1..=max_page_size`, using the
    /// default when none was asked for.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.stale_after(), Duration::seconds(30));
        assert_eq!(config.page_size(None), 20);
    }

    #[test]
    fn test_page_size_clamped() {
        let config = CacheConfig::default();
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(500)), 100);
        assert_eq!(config.page_size(Some(50)), 50);
    }

    #[test]
    fn test_negative_staleness_is_zero() {
        let config = CacheConfig {
            stale_after_secs: -5,
            ..CacheConfig::default()
        };
        assert_eq!(config.stale_after(), Duration::zero());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"stale_after_secs": 60}"#).expect("Failed to parse config");
        assert_eq!(config.stale_after_secs, 60);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("rostercache-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE);
        let config = CacheConfig {
            stale_after_secs: 45,
            ..CacheConfig::default()
        };
        config.save_to(&path).expect("save config");
        let loaded = CacheConfig::load_from(&path).expect("load config");
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(&dir);

        let missing = CacheConfig::load_from(&dir.join("missing.json")).expect("defaults");
        assert_eq!(missing, CacheConfig::default());
    }
}
