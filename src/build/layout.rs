// src/build/layout.rs

//! Directory layout used to resolve build config path templates.

use crate::config::model::Settings;

/// Conventional locations the path templates fall back to.
///
/// `base_dir` becomes `${base}` in source templates; `upload_base`
/// (`user@host:/root`) becomes `${base}`/`${version}` in upload templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub base_dir: String,
    pub upload_base: String,
}

impl Layout {
    pub fn new(base_dir: impl Into<String>, upload_base: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            upload_base: upload_base.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.layout.base_dir.clone(),
            settings.upload.destination_base(),
        )
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new("../..", "buildmanager@localhost:/volume1/version")
    }
}

/// Substitute every `${key}` placeholder in `template`, in the given order.
///
/// Unknown placeholders are left untouched.
pub fn expand(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        let needle = format!("${{{key}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_replaces_known_placeholders_only() {
        let out = expand(
            "${base}/${category}/${unknown}",
            &[("base", "/srv"), ("category", "router")],
        );
        assert_eq!(out, "/srv/router/${unknown}");
    }

    #[test]
    fn expand_replaces_repeated_placeholders() {
        assert_eq!(expand("${name}-${name}", &[("name", "x")]), "x-x");
    }
}
