//! Application configuration management.
//!
//! Configuration is stored at `~/.config/coursekeep/config.json` and may be
//! overridden per process through `COURSEKEEP_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::{DataServiceOptions, DEFAULT_LATENCY_MS, DEFAULT_STORAGE_KEY};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "coursekeep";

const CONFIG_FILE: &str = "config.json";

pub const ENV_LATENCY_MS: &str = "COURSEKEEP_LATENCY_MS";
pub const ENV_STORAGE: &str = "COURSEKEEP_STORAGE";
pub const ENV_DATA_DIR: &str = "COURSEKEEP_DATA_DIR";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    File,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File),
            other => anyhow::bail!("Unknown storage kind '{}' (expected memory or file)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageKind,
    /// Overrides the default `<cache_dir>/coursekeep`
    pub data_dir: Option<PathBuf>,
    pub storage_key: String,
    /// Simulated round-trip latency for every repository call
    pub latency_ms: u64,
    pub quota_bytes: Option<usize>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            data_dir: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            latency_ms: DEFAULT_LATENCY_MS,
            quota_bytes: None,
            log_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Write to the default location and return the path written
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `COURSEKEEP_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(ms) = lookup(ENV_LATENCY_MS) {
            self.latency_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of milliseconds", ENV_LATENCY_MS))?;
        }
        if let Some(kind) = lookup(ENV_STORAGE) {
            self.storage = kind.parse()?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn service_options(&self) -> DataServiceOptions {
        DataServiceOptions {
            storage_key: self.storage_key.clone(),
            latency: self.latency(),
            ..DataServiceOptions::default()
        }
    }

    /// Open the configured blob store
    pub fn open_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        let store: Arc<dyn KeyValueStore> = match self.storage {
            StorageKind::Memory => match self.quota_bytes {
                Some(limit) => Arc::new(MemoryStore::with_quota(limit)),
                None => Arc::new(MemoryStore::new()),
            },
            StorageKind::File => {
                let dir = self.data_dir()?;
                let store = FileStore::new(dir.clone())
                    .with_context(|| format!("Could not open data directory {}", dir.display()))?;
                Arc::new(store.with_quota(self.quota_bytes))
            }
        };
        Ok(store)
    }
}
