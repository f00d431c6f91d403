#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use muppet::config::Settings;
use muppet::exec::ProcessRunner;
use muppet::pool::{PipelineEnv, TaskEntity};
use muppet::types::TaskStatus;

pub use muppet_test_utils::{
    BuildConfigBuilder, MemorySink, ScriptedRunner, SettingsBuilder, init_tracing, is_alive,
    with_timeout,
};

pub fn env(settings: Settings, runner: ScriptedRunner) -> Arc<PipelineEnv> {
    let runner: Arc<dyn ProcessRunner> = Arc::new(runner);
    Arc::new(PipelineEnv::new(settings, runner))
}

/// Wait until `entity` reaches a terminal status and return it.
pub async fn settle(entity: &TaskEntity) -> TaskStatus {
    let mut rx = entity.subscribe();
    let status = with_timeout(rx.wait_for(|s| s.is_terminal()))
        .await
        .expect("status channel closed");
    *status
}

/// Poll `cond` every 10ms until it holds, for at most 5 seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
