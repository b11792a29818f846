//! Worker configuration management.
//!
//! This module holds the deployment-tunable surface of the cache engine:
//! the three cache-version identifiers, the install-time asset manifest, and
//! the strategy rule table. Bumping the version identifiers on a redeploy is
//! what forces a full cache invalidation at the next activation.
//!
//! Configuration round-trips as JSON; `load` falls back to the built-in
//! defaults when no file exists yet.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::{default_rules, RuleSpec};

/// Application name used for the default config path.
const APP_NAME: &str = "chartcache";

/// Config file name.
const CONFIG_FILE: &str = "worker.json";

/// Concurrent pre-cache fetches during install.
const DEFAULT_PRECACHE_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not determine a config directory")]
    NoConfigDir,
}

/// The three identifiers controlling partition naming and version-based
/// eviction. The activation sweep preserves only `static_partition` and
/// `dynamic_partition`; every other partition, the previous release tag
/// included, is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVersions {
    /// Release tag for the deployment as a whole.
    pub release: String,
    /// Partition holding the install-time asset set.
    pub static_partition: String,
    /// Partition written lazily as requests are served.
    pub dynamic_partition: String,
}

impl Default for CacheVersions {
    fn default() -> Self {
        Self {
            release: "viewmarket-v2".to_string(),
            static_partition: "static-v2".to_string(),
            dynamic_partition: "dynamic-v2".to_string(),
        }
    }
}

impl CacheVersions {
    /// The partition names that survive an activation sweep.
    pub fn retained(&self) -> [&str; 2] {
        [&self.static_partition, &self.dynamic_partition]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub versions: CacheVersions,
    /// Origin the pre-cache paths are resolved against.
    pub origin: String,
    /// Absolute paths fetched into the static partition at install time.
    pub precache: Vec<String>,
    pub precache_concurrency: usize,
    /// Ordered strategy rules; first match wins.
    pub rules: Vec<RuleSpec>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            versions: CacheVersions::default(),
            origin: "https://viewmarket.app".to_string(),
            precache: vec![
                "/".to_string(),
                "/charts".to_string(),
                "/manifest.json".to_string(),
                "/images/hero.webp".to_string(),
                "/css/main.css".to_string(),
            ],
            precache_concurrency: DEFAULT_PRECACHE_CONCURRENCY,
            rules: default_rules(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from `path`, or the defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyKind;

    #[test]
    fn test_default_manifest_and_versions() {
        let config = WorkerConfig::default();
        assert_eq!(config.precache.len(), 5);
        assert!(config.precache.contains(&"/charts".to_string()));
        assert_eq!(
            config.versions.retained(),
            ["static-v2", "dynamic-v2"]
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");

        let mut config = WorkerConfig::default();
        config.versions = CacheVersions {
            release: "viewmarket-v3".to_string(),
            static_partition: "static-v3".to_string(),
            dynamic_partition: "dynamic-v3".to_string(),
        };
        config.save(&path).unwrap();

        let loaded = WorkerConfig::load(&path).unwrap();
        assert_eq!(loaded.versions, config.versions);
        assert_eq!(loaded.rules.len(), config.rules.len());
        assert_eq!(loaded.rules[0].strategy, StrategyKind::CacheFirst);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = WorkerConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.origin, "https://viewmarket.app");
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"origin": "https://staging.viewmarket.app"}"#).unwrap();

        let loaded = WorkerConfig::load(&path).unwrap();
        assert_eq!(loaded.origin, "https://staging.viewmarket.app");
        assert_eq!(loaded.rules.len(), 4);
    }
}
