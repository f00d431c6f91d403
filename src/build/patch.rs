// src/build/patch.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::BuildConfig;
use crate::errors::{MuppetError, Result};

/// A partial build config.
///
/// Used for config modification requests and for the repository URL the
/// pipeline discovers at runtime. Absent fields leave the base value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfigPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default, rename = "extraParas")]
    pub extra: BTreeMap<String, Value>,
}

impl BuildConfigPatch {
    /// Patch targeting the config called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Layer `other` on top of `self`; `other` wins on every field it sets.
    pub fn merge(&self, other: &BuildConfigPatch) -> BuildConfigPatch {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        BuildConfigPatch {
            name: other.name.clone().or_else(|| self.name.clone()),
            category: other.category.clone().or_else(|| self.category.clone()),
            profile: other.profile.clone().or_else(|| self.profile.clone()),
            extra,
        }
    }

    /// Turn a patch that carries every identity field into a full config.
    pub fn into_config(self) -> Result<BuildConfig> {
        let missing = |field: &str| {
            MuppetError::InvalidBuildConfig(format!("patch has no `{field}` field"))
        };
        let name = self.name.ok_or_else(|| missing("name"))?;
        let category = self.category.ok_or_else(|| missing("category"))?;
        let profile = self.profile.ok_or_else(|| missing("profile"))?;

        let config = self
            .extra
            .into_iter()
            .fold(BuildConfig::new(name, category, profile), |cfg, (k, v)| {
                cfg.with_param(k, v)
            });

        if !config.is_valid() {
            return Err(MuppetError::InvalidBuildConfig(config.name().to_string()));
        }
        Ok(config)
    }
}

impl From<&BuildConfig> for BuildConfigPatch {
    fn from(cfg: &BuildConfig) -> Self {
        Self {
            name: Some(cfg.name().to_string()),
            category: Some(cfg.category().to_string()),
            profile: Some(cfg.profile().to_string()),
            extra: cfg.extra().clone(),
        }
    }
}
