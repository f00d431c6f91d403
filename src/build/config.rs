// src/build/config.rs

//! Build configuration values.
//!
//! A [`BuildConfig`] names one firmware build: its `name` (unique key in the
//! task pool), `category` (grouping), compiler `profile`, and an open-ended
//! bag of extra parameters (`extraParas`) holding path overrides and
//! pipeline switches. Values are never mutated in place; modifications
//! produce a new config via [`BuildConfig::with_param`] or
//! [`BuildConfig::apply`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::layout::{Layout, expand};
use super::patch::BuildConfigPatch;

/// Well-known keys in `extraParas`.
pub mod params {
    pub const SOURCE: &str = "source";
    pub const UPLOAD: &str = "upload";
    pub const LOCAL: &str = "local";
    pub const SVN: &str = "svn";
    pub const PROJECT_DIR: &str = "projectDir";
    pub const UPDATE: &str = "update";
    pub const BUILD_ONLY_IF_UPDATED: &str = "buildOnlyIfUpdated";
    pub const REV: &str = "rev";
}

const DEFAULT_TEMPLATE: &str = "${default}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    name: String,
    category: String,
    profile: String,
    #[serde(default, rename = "extraParas")]
    extra: BTreeMap<String, Value>,
}

impl BuildConfig {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            profile: profile.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// A config may only enter the task pool when this holds.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.category.trim().is_empty()
            && !self.profile.trim().is_empty()
    }

    /// Copy of this config with one extra parameter set.
    pub fn with_param(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.extra.insert(key.into(), value.into());
        next
    }

    /// Copy of this config with `patch` layered on top.
    ///
    /// Fields present in the patch win; `extraParas` are merged key by key.
    pub fn apply(&self, patch: &BuildConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(category) = &patch.category {
            next.category = category.clone();
        }
        if let Some(profile) = &patch.profile {
            next.profile = profile.clone();
        }
        for (key, value) in &patch.extra {
            next.extra.insert(key.clone(), value.clone());
        }
        next
    }

    /// Text form of a parameter. Strings, numbers and booleans are accepted;
    /// empty strings count as absent.
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean parameter; accepts `true`/`false` or the strings `"true"`/`"false"`.
    pub fn param_flag(&self, key: &str) -> Option<bool> {
        match self.extra.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// `projectDir` if set, otherwise the config name.
    pub fn project_dir(&self) -> String {
        self.param_str(params::PROJECT_DIR)
            .unwrap_or_else(|| self.name.clone())
    }

    /// Recorded repository URL, if any.
    pub fn remote(&self) -> Option<String> {
        self.param_str(params::SVN)
    }

    /// Pinned revision, if any.
    pub fn revision(&self) -> Option<String> {
        self.param_str(params::REV)
    }

    /// Whether the sync step runs at all (`update = false` skips it).
    pub fn should_sync(&self) -> bool {
        self.param_flag(params::UPDATE).unwrap_or(true)
    }

    pub fn build_only_if_updated(&self) -> bool {
        self.param_flag(params::BUILD_ONLY_IF_UPDATED)
            .unwrap_or(false)
    }

    /// Resolved source (checkout) directory.
    pub fn source(&self, layout: &Layout) -> String {
        let project_dir = self.project_dir();
        let default = format!("{}/{}/{}", layout.base_dir, self.category, project_dir);
        let template = self
            .param_str(params::SOURCE)
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());

        expand(
            &template,
            &[
                ("default", &default),
                ("base", &layout.base_dir),
                ("category", &self.category),
                ("name", &self.name),
                ("projectDir", &project_dir),
            ],
        )
    }

    /// Resolved upload destination (`user@host:/path`).
    pub fn upload(&self, layout: &Layout) -> String {
        let project_dir = self.project_dir();
        let default = format!("{}/{}/{}", layout.upload_base, self.category, project_dir);
        let template = self
            .param_str(params::UPLOAD)
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());

        expand(
            &template,
            &[
                ("default", &default),
                ("base", &layout.upload_base),
                ("version", &layout.upload_base),
                ("category", &self.category),
                ("name", &self.name),
                ("projectDir", &project_dir),
            ],
        )
    }

    /// Resolved working path the build script runs in.
    ///
    /// `<source>/<local>` when `local` is set, otherwise the source directory.
    pub fn local(&self, layout: &Layout) -> String {
        let source = self.source(layout);
        match self.param_str(params::LOCAL) {
            Some(local) => format!("{}/{}", source.trim_end_matches('/'), local),
            None => source,
        }
    }

    /// Two configs conflict when they resolve to the same source directory.
    pub fn conflicts(&self, other: &BuildConfig, layout: &Layout) -> bool {
        self.source(layout) == other.source(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> Layout {
        Layout::new("../..", "buildmanager@nas:/volume1/version")
    }

    #[test]
    fn default_paths_follow_category_and_name() {
        let cfg = BuildConfig::new("r1", "router", "release");
        assert_eq!(cfg.source(&layout()), "../../router/r1");
        assert_eq!(cfg.local(&layout()), "../../router/r1");
        assert_eq!(
            cfg.upload(&layout()),
            "buildmanager@nas:/volume1/version/router/r1"
        );
    }

    #[test]
    fn project_dir_replaces_name_in_defaults() {
        let cfg = BuildConfig::new("r1", "router", "release").with_param("projectDir", "fw-r1");
        assert_eq!(cfg.source(&layout()), "../../router/fw-r1");
        assert_eq!(
            cfg.upload(&layout()),
            "buildmanager@nas:/volume1/version/router/fw-r1"
        );
    }

    #[test]
    fn templates_expand_placeholders() {
        let cfg = BuildConfig::new("r1", "router", "release")
            .with_param("source", "${base}/trunk/${name}")
            .with_param("upload", "${version}/nightly/${category}")
            .with_param("local", "sub");
        assert_eq!(cfg.source(&layout()), "../../trunk/r1");
        assert_eq!(cfg.local(&layout()), "../../trunk/r1/sub");
        assert_eq!(
            cfg.upload(&layout()),
            "buildmanager@nas:/volume1/version/nightly/router"
        );
    }

    #[test]
    fn default_placeholder_can_be_extended() {
        let cfg = BuildConfig::new("r1", "router", "release").with_param("source", "${default}-v2");
        assert_eq!(cfg.source(&layout()), "../../router/r1-v2");
    }

    #[test]
    fn flags_accept_bool_and_string_forms() {
        let cfg = BuildConfig::new("r1", "router", "release")
            .with_param("buildOnlyIfUpdated", "true")
            .with_param("update", json!(false));
        assert!(cfg.build_only_if_updated());
        assert!(!cfg.should_sync());

        let plain = BuildConfig::new("r1", "router", "release");
        assert!(!plain.build_only_if_updated());
        assert!(plain.should_sync());
    }

    #[test]
    fn revision_accepts_numbers() {
        let cfg = BuildConfig::new("r1", "router", "release").with_param("rev", json!(1024));
        assert_eq!(cfg.revision().as_deref(), Some("1024"));
    }

    #[test]
    fn blank_identity_fields_are_invalid() {
        assert!(BuildConfig::new("r1", "router", "release").is_valid());
        assert!(!BuildConfig::new("", "router", "release").is_valid());
        assert!(!BuildConfig::new("r1", " ", "release").is_valid());
        assert!(!BuildConfig::new("r1", "router", "").is_valid());
    }

    #[test]
    fn with_param_leaves_original_untouched() {
        let cfg = BuildConfig::new("r1", "router", "release");
        let next = cfg.with_param("svn", "svn://repo/r1");
        assert_eq!(cfg.remote(), None);
        assert_eq!(next.remote().as_deref(), Some("svn://repo/r1"));
    }

    #[test]
    fn conflicts_compare_resolved_sources() {
        let a = BuildConfig::new("a", "router", "release").with_param("source", "/tmp/x");
        let b = BuildConfig::new("b", "switch", "debug").with_param("source", "/tmp/x");
        let c = BuildConfig::new("c", "router", "release");
        assert!(a.conflicts(&b, &layout()));
        assert!(b.conflicts(&a, &layout()));
        assert!(!a.conflicts(&c, &layout()));
    }

    #[test]
    fn json_shape_uses_extra_paras_key() {
        let cfg: BuildConfig = serde_json::from_value(json!({
            "name": "r1",
            "category": "router",
            "profile": "release",
            "extraParas": { "svn": "svn://repo/r1" }
        }))
        .unwrap();
        assert_eq!(cfg.remote().as_deref(), Some("svn://repo/r1"));
    }
}
