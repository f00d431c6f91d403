// src/build/mod.rs

//! Build configuration model.
//!
//! - [`config`] holds the immutable [`BuildConfig`] value and its derived
//!   paths (source, local working path, upload destination).
//! - [`patch`] holds [`BuildConfigPatch`], the partial form used for merges.
//! - [`layout`] holds the conventional directory layout and the `${key}`
//!   template expansion the derived paths are built with.

pub mod config;
pub mod layout;
pub mod patch;

pub use config::{BuildConfig, params};
pub use layout::Layout;
pub use patch::BuildConfigPatch;
