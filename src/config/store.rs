// src/config/store.rs

//! Persistence for build configs.
//!
//! The on-disk form groups configs by category:
//!
//! ```json
//! {
//!   "router": {
//!     "r1": { "name": "r1", "category": "router", "profile": "release", "extraParas": {} }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::build::BuildConfig;
use crate::errors::Result;

/// Build configs keyed by name.
pub type ConfigMap = BTreeMap<String, BuildConfig>;

pub trait ConfigStore: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<ConfigMap>;

    fn save(&self, configs: &ConfigMap) -> Result<()>;
}

/// Store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonConfigStore {
    /// A missing file is an empty store. Entries that do not parse, or that
    /// fail validation, are skipped with a warning.
    fn load(&self) -> Result<ConfigMap> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "build list not found; starting empty");
            return Ok(ConfigMap::new());
        }

        let text = fs::read_to_string(&self.path)?;
        let grouped: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_str(&text)?;

        let mut configs = ConfigMap::new();
        for (category, entries) in grouped {
            for (key, value) in entries {
                match serde_json::from_value::<BuildConfig>(value) {
                    Ok(cfg) if cfg.is_valid() => {
                        if cfg.category() != category {
                            debug!(name = %key, %category, actual = %cfg.category(), "config filed under another category");
                        }
                        configs.insert(cfg.name().to_string(), cfg);
                    }
                    Ok(_) => warn!(name = %key, %category, "skipping invalid build config"),
                    Err(e) => warn!(name = %key, %category, error = %e, "skipping unreadable build config"),
                }
            }
        }

        info!(path = %self.path.display(), count = configs.len(), "build list loaded");
        Ok(configs)
    }

    fn save(&self, configs: &ConfigMap) -> Result<()> {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, &BuildConfig>> = BTreeMap::new();
        for cfg in configs.values() {
            grouped
                .entry(cfg.category())
                .or_default()
                .insert(cfg.name(), cfg);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&grouped)?;
        fs::write(&self.path, text)?;

        debug!(path = %self.path.display(), count = configs.len(), "build list saved");
        Ok(())
    }
}

/// In-memory store, for tests and `--dry-run`.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: Mutex<ConfigMap>,
}

impl MemoryConfigStore {
    pub fn new(configs: impl IntoIterator<Item = BuildConfig>) -> Self {
        Self {
            configs: Mutex::new(
                configs
                    .into_iter()
                    .map(|c| (c.name().to_string(), c))
                    .collect(),
            ),
        }
    }

    /// Current saved contents.
    pub fn snapshot(&self) -> ConfigMap {
        self.configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<ConfigMap> {
        Ok(self.snapshot())
    }

    fn save(&self, configs: &ConfigMap) -> Result<()> {
        *self.configs.lock().unwrap_or_else(PoisonError::into_inner) = configs.clone();
        Ok(())
    }
}
