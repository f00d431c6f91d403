// src/config/center.rs

//! Config center actor: the in-memory build list plus its store.
//!
//! Serves [`ConfigEvent`]s. Every successful mutation is written back to the
//! store right away; a failed write is reported in the reply but the
//! in-memory change is kept.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::{ConfigMap, ConfigStore};
use crate::build::{BuildConfig, BuildConfigPatch};
use crate::dispatch::{Actor, ActorContext};
use crate::events::{ConfigEvent, Event, EventKind};

pub const SUCCESS: &str = "Success";
pub const DUPLICATED: &str = "Target config duplicated";
pub const INVALID_CONFIG: &str = "Invalid build config";
pub const NOT_FOUND: &str = "Can not find target config";

#[derive(Debug)]
pub struct ConfigCenter {
    store: Arc<dyn ConfigStore>,
    configs: ConfigMap,
}

impl ConfigCenter {
    pub fn new(store: Arc<dyn ConfigStore>, configs: ConfigMap) -> Self {
        Self { store, configs }
    }

    /// Load the initial build list from `store`.
    pub fn load(store: Arc<dyn ConfigStore>) -> crate::errors::Result<Self> {
        let configs = store.load()?;
        Ok(Self::new(store, configs))
    }

    pub fn get(&self, name: &str) -> Option<BuildConfig> {
        self.configs.get(name).cloned()
    }

    /// Name to category for every config.
    pub fn list(&self) -> BTreeMap<String, String> {
        self.configs
            .values()
            .map(|c| (c.name().to_string(), c.category().to_string()))
            .collect()
    }

    pub fn configs(&self) -> &ConfigMap {
        &self.configs
    }

    pub fn add(&mut self, config: BuildConfig) -> String {
        if !config.is_valid() {
            return INVALID_CONFIG.to_string();
        }
        if self.configs.contains_key(config.name()) {
            return DUPLICATED.to_string();
        }
        info!(name = %config.name(), category = %config.category(), "config added");
        self.configs.insert(config.name().to_string(), config);
        self.save()
    }

    /// Layer `patch` onto the config it names.
    pub fn modify(&mut self, patch: BuildConfigPatch) -> String {
        let Some(name) = patch.name.clone() else {
            return INVALID_CONFIG.to_string();
        };
        let Some(current) = self.configs.get(&name) else {
            return NOT_FOUND.to_string();
        };

        let next = current.apply(&patch);
        if !next.is_valid() {
            return INVALID_CONFIG.to_string();
        }
        debug!(%name, ?patch, "config modified");
        self.configs.insert(name, next);
        self.save()
    }

    pub fn delete(&mut self, name: &str) -> String {
        if self.configs.remove(name).is_none() {
            return NOT_FOUND.to_string();
        }
        info!(%name, "config deleted");
        self.save()
    }

    pub fn save(&self) -> String {
        match self.store.save(&self.configs) {
            Ok(()) => SUCCESS.to_string(),
            Err(e) => {
                warn!(error = %e, "failed to save build list");
                e.to_string()
            }
        }
    }

    /// Replace the in-memory list with the store's contents.
    pub fn reload(&mut self) -> String {
        match self.store.load() {
            Ok(configs) => {
                info!(count = configs.len(), "build list reloaded");
                self.configs = configs;
                SUCCESS.to_string()
            }
            Err(e) => {
                warn!(error = %e, "failed to reload build list; keeping current");
                e.to_string()
            }
        }
    }
}

impl Actor for ConfigCenter {
    fn name(&self) -> &'static str {
        "config-center"
    }

    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::Config]
    }

    async fn handle(&mut self, event: Event, _ctx: &ActorContext) {
        let Event::Config(event) = event else {
            return;
        };

        match event {
            ConfigEvent::Get(envelope) => {
                envelope.reply(self.get(envelope.payload()));
            }
            ConfigEvent::List(envelope) => {
                envelope.reply(self.list());
            }
            ConfigEvent::Add(envelope) => {
                let (config, reply) = envelope.into_parts();
                reply.send(self.add(config));
            }
            ConfigEvent::Modify(envelope) => {
                let (patch, reply) = envelope.into_parts();
                reply.send(self.modify(patch));
            }
            ConfigEvent::Delete(envelope) => {
                let (name, reply) = envelope.into_parts();
                reply.send(self.delete(&name));
            }
            ConfigEvent::Save(envelope) => {
                envelope.reply(self.save());
            }
            ConfigEvent::Reload(envelope) => {
                envelope.reply(self.reload());
            }
        }
    }

    async fn stopping(&mut self) {
        let reply = self.save();
        if reply != SUCCESS {
            warn!(%reply, "build list not saved on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::MemoryConfigStore;

    fn center() -> (Arc<MemoryConfigStore>, ConfigCenter) {
        let store = Arc::new(MemoryConfigStore::new([BuildConfig::new("r1", "router", "release")]));
        let center = ConfigCenter::load(store.clone()).unwrap();
        (store, center)
    }

    #[test]
    fn add_saves_and_rejects_duplicates() {
        let (store, mut center) = center();
        assert_eq!(center.add(BuildConfig::new("s1", "switch", "debug")), SUCCESS);
        assert!(store.snapshot().contains_key("s1"));
        assert_eq!(center.add(BuildConfig::new("s1", "switch", "release")), DUPLICATED);
        assert_eq!(center.add(BuildConfig::new("x", "", "release")), INVALID_CONFIG);
    }

    #[test]
    fn modify_merges_discovered_remote() {
        let (store, mut center) = center();
        let patch = BuildConfigPatch::named("r1").with_param("svn", "svn://repo/r1");
        assert_eq!(center.modify(patch), SUCCESS);
        assert_eq!(
            store.snapshot()["r1"].remote().as_deref(),
            Some("svn://repo/r1")
        );
        assert_eq!(center.modify(BuildConfigPatch::named("ghost")), NOT_FOUND);
        assert_eq!(center.modify(BuildConfigPatch::default()), INVALID_CONFIG);
    }

    #[test]
    fn delete_and_list() {
        let (_, mut center) = center();
        assert_eq!(center.list().get("r1").map(String::as_str), Some("router"));
        assert_eq!(center.delete("r1"), SUCCESS);
        assert_eq!(center.delete("r1"), NOT_FOUND);
        assert!(center.get("r1").is_none());
    }

    #[test]
    fn reload_replaces_memory_view() {
        let (store, mut center) = center();
        center.configs.clear();
        assert_eq!(center.reload(), SUCCESS);
        assert!(center.get("r1").is_some());
        assert_eq!(store.snapshot().len(), 1);
    }
}
