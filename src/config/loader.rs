// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{RawSettings, Settings};
use crate::errors::Result;

/// Load a settings file from a given path and return the raw `RawSettings`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let settings: RawSettings = toml::from_str(&contents)?;

    Ok(settings)
}

/// Load a settings file from path and run validation.
///
/// A missing file is not an error: every section has defaults, so the
/// controller can start with no settings file at all.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let raw = if path.exists() {
        load_from_path(path)?
    } else {
        info!(path = %path.display(), "settings file not found; using defaults");
        RawSettings::default()
    };
    Settings::try_from(raw)
}

/// Default settings path: `Muppet.toml` in the current working directory.
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("Muppet.toml")
}
