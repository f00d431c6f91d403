#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use muppet::build::BuildConfig;
use muppet::config::Settings;
use serde_json::Value;

/// Builder for `BuildConfig` to simplify test setup.
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: BuildConfig::new(name, "router", "release"),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config = self.config.with_param(key, value);
        self
    }

    /// Absolute source directory (no template).
    pub fn source(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_string_lossy().into_owned();
        self.param("source", dir)
    }

    pub fn svn(self, url: &str) -> Self {
        self.param("svn", url)
    }

    pub fn upload(self, destination: &str) -> Self {
        self.param("upload", destination)
    }

    pub fn no_sync(self) -> Self {
        self.param("update", false)
    }

    pub fn build_only_if_updated(self) -> Self {
        self.param("buildOnlyIfUpdated", true)
    }

    pub fn build(self) -> BuildConfig {
        self.config
    }
}

/// Builder for `Settings`, starting from the defaults with short timeouts.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        let mut settings = Settings::default();
        settings.vcs.exit_timeout = Duration::from_secs(2);
        settings.upload.retry_delay = Duration::from_millis(10);
        settings.pool.reconcile_interval = Duration::from_millis(100);
        Self { settings }
    }

    pub fn max_concurrency(mut self, cap: usize) -> Self {
        self.settings.pool.max_concurrency = cap;
        self
    }

    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.settings.pool.reconcile_interval = interval;
        self
    }

    pub fn base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.settings.layout.base_dir = dir.as_ref().to_string_lossy().into_owned();
        self
    }

    pub fn image_dir(mut self, dir: &str) -> Self {
        self.settings.layout.image_dir = dir.to_string();
        self
    }

    pub fn min_artifact_size(mut self, bytes: u64) -> Self {
        self.settings.layout.min_artifact_size = bytes;
        self
    }

    pub fn build_script(mut self, script: &str) -> Self {
        self.settings.layout.build_script = script.to_string();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.settings.upload.max_retries = retries;
        self
    }

    pub fn upload_root(mut self, root: &str) -> Self {
        self.settings.upload.root = root.to_string();
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
