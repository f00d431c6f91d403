// src/lib.rs

pub mod build;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod pool;
pub mod sink;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::build::Layout;
use crate::cli::CliArgs;
use crate::client::Client;
use crate::config::{ConfigCenter, ConfigStore, JsonConfigStore, Settings, load_and_validate};
use crate::console::Console;
use crate::dispatch::{ActorHandle, EventRouter};
use crate::exec::ShellRunner;
use crate::pool::{PipelineEnv, TaskPoolManager};
use crate::sink::{BroadcastSink, Broadcaster, LogSink};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - settings and build list loading
/// - the config center, task pool, broadcaster and console actors
/// - the event router
/// - `--execute` builds and Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let settings = load_and_validate(&args.config)
        .with_context(|| format!("loading settings from {}", args.config))?;
    let store: Arc<dyn ConfigStore> = Arc::new(JsonConfigStore::new(settings.store.build_list.clone()));

    if args.dry_run {
        print_dry_run(&settings, store.as_ref())?;
        return Ok(0);
    }

    let capacity = settings.pool.mailbox_capacity;
    let sink: Arc<dyn LogSink> = Arc::new(BroadcastSink::default());
    let env = Arc::new(PipelineEnv::new(settings, Arc::new(ShellRunner)));

    let center = ConfigCenter::load(store).context("loading build list")?;

    let mut actors = vec![
        ActorHandle::spawn(center, capacity),
        ActorHandle::spawn(TaskPoolManager::new(env, Arc::clone(&sink)), capacity),
        ActorHandle::spawn(Broadcaster::new(sink), capacity),
    ];
    if !args.no_console {
        actors.push(ActorHandle::spawn(Console::new()?, capacity));
    }

    let router = EventRouter::new(actors, capacity);
    info!(actors = ?router.actor_names(), "router ready");
    let client = Client::new(router.publisher());

    // Ctrl-C → graceful shutdown.
    {
        let client = client.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; shutting down");
            if let Err(e) = client.shutdown(0).await {
                warn!(error = %e, "failed to request shutdown");
            }
        });
    }

    if !args.execute.is_empty() {
        let names = args.execute.clone();
        tokio::spawn(async move {
            for name in names {
                match client.execute(&name).await {
                    Ok(reply) => info!(task = %name, %reply, "startup build requested"),
                    Err(e) => warn!(task = %name, error = %e, "startup build request failed"),
                }
            }
        });
    }

    let code = router.run().await;
    debug!(exit_code = code, "router finished");
    Ok(code)
}

/// Dry-run output: settings summary and every stored config with its
/// resolved paths.
fn print_dry_run(settings: &Settings, store: &dyn ConfigStore) -> Result<()> {
    let layout = Layout::from_settings(settings);
    let configs = store.load().context("loading build list")?;

    println!("muppet dry-run");
    println!("  pool.max_concurrency = {}", settings.pool.max_concurrency);
    println!("  pool.reconcile_interval = {:?}", settings.pool.reconcile_interval);
    println!("  layout.base_dir = {}", settings.layout.base_dir);
    println!("  layout.build_script = {}", settings.layout.build_script);
    println!("  upload.destination = {}", layout.upload_base);
    println!("  store.build_list = {}", settings.store.build_list.display());
    println!();

    println!("configs ({}):", configs.len());
    for (name, cfg) in &configs {
        println!("  - {name} [{}] profile={}", cfg.category(), cfg.profile());
        println!("      source: {}", cfg.source(&layout));
        println!("      local:  {}", cfg.local(&layout));
        println!("      upload: {}", cfg.upload(&layout));
        if let Some(remote) = cfg.remote() {
            println!("      svn: {remote}");
        }
        if let Some(rev) = cfg.revision() {
            println!("      rev: {rev}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
