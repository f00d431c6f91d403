// src/pool/mod.rs

//! Task pool: admission, per-task build pipelines and their lifecycle.
//!
//! - [`manager`]: the [`TaskPoolManager`] actor owning the pool map and
//!   running the reconciliation loop.
//! - [`entity`]: one [`TaskEntity`] per build request.
//! - [`pipeline`]: the ordered build steps a started entity runs.
//! - [`admission`]: the pure admission policy (cap + source conflicts).
//! - [`status`]: the observable status cell shared by entity and lane.

use std::sync::Arc;

use crate::build::Layout;
use crate::config::Settings;
use crate::exec::ProcessRunner;

pub mod admission;
pub mod entity;
pub mod manager;
pub mod pipeline;
pub mod status;

pub use admission::{Candidate, admit};
pub use entity::{TaskEntity, TaskHooks};
pub use manager::TaskPoolManager;
pub use pipeline::{PipelineError, Step, WorkingCopy, plan};
pub use status::StatusCell;

/// Everything a pipeline needs from the outside world.
#[derive(Debug)]
pub struct PipelineEnv {
    pub settings: Settings,
    pub layout: Layout,
    pub runner: Arc<dyn ProcessRunner>,
}

impl PipelineEnv {
    pub fn new(settings: Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        let layout = Layout::from_settings(&settings);
        Self {
            settings,
            layout,
            runner,
        }
    }
}
