// src/config/mod.rs

//! Configuration for muppet.
//!
//! Responsibilities:
//! - Define the TOML-backed settings model (`model.rs`) and its duration
//!   strings (`duration.rs`).
//! - Load a settings file from disk (`loader.rs`) and validate it into
//!   [`Settings`] (`validate.rs`).
//! - Persist the build list (`store.rs`) and serve it to other actors
//!   (`center.rs`).

pub mod center;
pub mod duration;
pub mod loader;
pub mod model;
pub mod store;
pub mod validate;

pub use center::ConfigCenter;
pub use loader::{default_settings_path, load_and_validate, load_from_path};
pub use model::{LayoutSettings, PoolSettings, RawSettings, Settings, StoreSettings, UploadSettings, VcsSettings};
pub use store::{ConfigMap, ConfigStore, JsonConfigStore, MemoryConfigStore};
