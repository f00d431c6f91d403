mod common;
use crate::common::{
    BuildConfigBuilder, MemorySink, ScriptedRunner, SettingsBuilder, env, init_tracing, settle,
};

use std::path::Path;
use std::sync::Arc;

use muppet::build::{BuildConfig, BuildConfigPatch};
use muppet::config::Settings;
use muppet::errors::Result;
use muppet::exec::{ProcessHandle, ProcessRunner};
use muppet::pool::{PipelineEnv, TaskEntity, TaskHooks};
use muppet::types::TaskStatus;

fn settings() -> Settings {
    SettingsBuilder::new()
        .image_dir("images")
        .min_artifact_size(1024)
        .build()
}

/// Compile script that leaves a `bytes`-sized artifact in `<source>/images`.
fn produce_artifact(source: &Path, bytes: usize) -> String {
    let images = source.join("images");
    format!(
        "mkdir -p '{dir}' && head -c {bytes} /dev/zero > '{dir}/fw-001.tar.gz' && echo built",
        dir = images.display()
    )
}

async fn run_task(config: BuildConfig, runner: ScriptedRunner, sink: Arc<MemorySink>) -> TaskStatus {
    run_task_with(settings(), config, runner, sink).await
}

async fn run_task_with(
    settings: Settings,
    config: BuildConfig,
    runner: ScriptedRunner,
    sink: Arc<MemorySink>,
) -> TaskStatus {
    let entity = TaskEntity::new(config, 0, env(settings, runner), TaskHooks::logging(sink)).unwrap();
    entity.start().unwrap();
    settle(&entity).await
}

fn synced(dir: &Path) -> BuildConfig {
    BuildConfigBuilder::new("r1")
        .source(dir)
        .svn("svn://repo/r1")
        .no_sync()
        .build()
}

/// Runner that blows up inside a pipeline step.
#[derive(Debug)]
struct ExplodingRunner;

impl ProcessRunner for ExplodingRunner {
    fn spawn_shell(&self, line: &str) -> Result<ProcessHandle> {
        panic!("runner exploded on `{line}`");
    }
}

#[tokio::test]
async fn undersized_artifact_fails_without_transfer() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new()
        .on("release clean", "true")
        .on("mkfw.sh", &produce_artifact(dir.path(), 100));
    let sink = Arc::new(MemorySink::new());

    let config = BuildConfigBuilder::new("r1")
        .source(dir.path())
        .svn("svn://repo/r1")
        .no_sync()
        .build();
    let status = run_task(config, runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Error);
    assert!(sink.contains("r1", "Image size is not right"));
    assert!(!runner.ran("scp"));
}

#[tokio::test]
async fn unchanged_revision_finishes_without_compiling() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join(".svn")).unwrap();

    let runner = ScriptedRunner::new().on(
        "svn info",
        "printf 'URL: svn://repo/r1\\nRevision: 50\\nLast Changed Rev: 42\\n'",
    );
    let sink = Arc::new(MemorySink::new());

    let config = BuildConfigBuilder::new("r1")
        .source(dir.path())
        .svn("svn://repo/r1")
        .build_only_if_updated()
        .build();
    let status = run_task(config, runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Finished);
    assert!(runner.ran("svn cleanup"));
    assert!(!runner.ran("svn update"));
    assert!(!runner.ran("mkfw.sh"));
    assert!(sink.contains("r1", "No update with remote rev=42 local rev=42, task finished"));
}

#[tokio::test]
async fn changed_revision_updates_and_builds() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join(".svn")).unwrap();

    let runner = ScriptedRunner::new()
        .on("svn info svn://", "echo 'Last Changed Rev: 43'")
        .on("svn info", "echo 'Last Changed Rev: 42'")
        .on("release clean", "true")
        .on("mkfw.sh", &produce_artifact(dir.path(), 4096));
    let sink = Arc::new(MemorySink::new());

    let config = BuildConfigBuilder::new("r1")
        .source(dir.path())
        .svn("svn://repo/r1")
        .build_only_if_updated()
        .build();
    let status = run_task(config, runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Finished);
    assert!(runner.ran("svn update"));
    assert!(sink.contains("r1", "Remote rev=43 local rev=42, updating"));
    assert!(sink.contains("r1", "Compile finished"));
    assert!(sink.contains("r1", "Upload success"));
}

#[tokio::test]
async fn lost_connection_is_retried() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("attempted");
    let flaky_scp = format!(
        "if [ -f '{m}' ]; then echo ok; else touch '{m}'; echo 'lost connection' >&2; exit 1; fi",
        m = marker.display()
    );

    let runner = ScriptedRunner::new()
        .on("scp ", &flaky_scp)
        .on("release clean", "true")
        .on("mkfw.sh", &produce_artifact(dir.path(), 4096));
    let sink = Arc::new(MemorySink::new());

    let config = BuildConfigBuilder::new("r1")
        .source(dir.path())
        .svn("svn://repo/r1")
        .no_sync()
        .build();
    let status = run_task(config, runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(runner.commands_matching("scp ").len(), 2);
    assert!(sink.contains("r1", "Connection lost, retrying upload"));
    assert!(sink.contains("r1", "Upload success"));
    assert!(runner.ran("mkdir /volume1/version/router/r1"));
}

#[tokio::test]
async fn unreadable_working_copy_without_remote_is_an_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().on("svn info", "echo \"svn: E155007: not a working copy\" >&2; exit 1");
    let sink = Arc::new(MemorySink::new());

    let config = BuildConfigBuilder::new("r1").source(dir.path()).build();
    let status = run_task(config, runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Error);
    assert!(sink.contains("r1", "Can not read svn info in path"));
    assert!(!runner.ran("mkfw.sh"));
}

#[tokio::test]
async fn discovered_remote_is_reported_and_used_for_checkout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("fresh");

    let runner = ScriptedRunner::new()
        .on("svn info", "echo 'URL: svn://repo/found'")
        .on("svn checkout", "echo 'Checked out revision 7.'")
        .on("mkfw.sh", "exit 2");
    let sink = Arc::new(MemorySink::new());

    let discovered = Arc::new(std::sync::Mutex::new(Vec::new()));
    let hooks = {
        let discovered = discovered.clone();
        TaskHooks {
            remote_discovered: Arc::new(move |patch: BuildConfigPatch| discovered.lock().unwrap().push(patch)),
            ..TaskHooks::logging(sink.clone())
        }
    };

    let config = BuildConfigBuilder::new("r1").source(&source).build();
    let entity = TaskEntity::new(config, 0, env(settings(), runner.clone()), hooks).unwrap();
    entity.start().unwrap();
    let status = settle(&entity).await;

    // The compile script fails on purpose; everything before it must have run.
    assert_eq!(status, TaskStatus::Error);
    assert!(source.is_dir());
    assert_eq!(runner.commands_matching("svn checkout svn://repo/found").len(), 1);
    assert!(sink.contains("r1", "Compile failed with exit code 2"));

    let patches = discovered.lock().unwrap();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].name.as_deref(), Some("r1"));
    assert_eq!(patches[0].extra["svn"], "svn://repo/found");
}

#[tokio::test]
async fn upload_gives_up_after_max_retries() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new()
        .on("scp ", "echo 'lost connection' >&2; exit 1")
        .on("release clean", "true")
        .on("mkfw.sh", &produce_artifact(dir.path(), 4096));
    let sink = Arc::new(MemorySink::new());

    let settings = SettingsBuilder::new()
        .image_dir("images")
        .min_artifact_size(1024)
        .max_retries(2)
        .build();
    let status = run_task_with(settings, synced(dir.path()), runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Error);
    assert_eq!(runner.commands_matching("scp ").len(), 3);
    assert!(sink.contains("r1", "Connection lost, retrying upload (2/2)"));
    assert!(sink.contains("r1", "Upload failed"));
    assert!(!sink.contains("r1", "Upload success"));
}

#[tokio::test]
async fn upload_failure_without_lost_connection_is_not_retried() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new()
        .on("scp ", "echo 'Permission denied' >&2; exit 1")
        .on("release clean", "true")
        .on("mkfw.sh", &produce_artifact(dir.path(), 4096));
    let sink = Arc::new(MemorySink::new());

    let status = run_task(synced(dir.path()), runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Error);
    assert_eq!(runner.commands_matching("scp ").len(), 1);
    assert!(sink.contains("r1", "Upload failed"));
    assert!(!sink.contains("r1", "retrying upload"));
}

#[tokio::test]
async fn non_utf8_compiler_output_does_not_fail_the_build() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // A Latin-1 byte, then enough output to overflow a pipe buffer.
    let compile = format!(
        "{} && printf 'caf\\351\\n' && printf 'warn\\351\\n' >&2 && seq 1 40000 && echo after-bad-line",
        produce_artifact(dir.path(), 4096)
    );
    let runner = ScriptedRunner::new()
        .on("release clean", "true")
        .on("mkfw.sh", &compile);
    let sink = Arc::new(MemorySink::new());

    let status = run_task(synced(dir.path()), runner.clone(), sink.clone()).await;

    assert_eq!(status, TaskStatus::Finished);
    assert!(sink.contains("r1", "caf\u{FFFD}"));
    assert!(sink.contains("r1", "warn\u{FFFD}"));
    assert!(sink.contains("r1", "after-bad-line"));
    assert!(sink.contains("r1", "Compile finished"));
    assert!(sink.contains("r1", "Upload success"));
}

#[tokio::test]
async fn panicking_step_ends_in_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let runner: Arc<dyn ProcessRunner> = Arc::new(ExplodingRunner);
    let env = Arc::new(PipelineEnv::new(settings(), runner));

    let entity = TaskEntity::new(synced(dir.path()), 0, env, TaskHooks::logging(sink.clone())).unwrap();
    entity.start().unwrap();

    assert_eq!(settle(&entity).await, TaskStatus::Error);
    assert!(sink.contains("r1", "Internal error: runner exploded"));
}
