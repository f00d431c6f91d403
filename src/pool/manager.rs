// src/pool/manager.rs

//! The task pool manager actor.
//!
//! Owns the `name -> TaskEntity` map. The map is only touched from the
//! actor's own task (mailbox handlers and wake-ups never overlap), so it
//! needs no lock. Task state that changes off-lane (status, live process)
//! lives inside each entity behind its own synchronization.
//!
//! A reconciliation pass runs on every wake-up: either the periodic
//! fallback timer or the wake signal, which is notified whenever a task is
//! created, stopped or finishes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::PipelineEnv;
use super::admission::{Candidate, admit};
use super::entity::{TaskEntity, TaskHooks};
use crate::build::{BuildConfig, BuildConfigPatch};
use crate::dispatch::{Actor, ActorContext, Envelope, Publisher};
use crate::events::{ConfigEvent, Event, EventKind, PoolEvent, ServerEvent};
use crate::sink::LogSink;
use crate::types::{STATUS_NOT_FOUND, TaskStatus};

pub const SUCCESS: &str = "Success";
pub const DUPLICATED: &str = "Target task duplicated";
pub const INVALID_CONFIG: &str = "Invalid build config";
pub const NOT_FOUND: &str = "Can not find target task";

#[derive(Debug)]
pub struct TaskPoolManager {
    env: Arc<PipelineEnv>,
    log: Arc<dyn LogSink>,
    pool: HashMap<String, TaskEntity>,
    max_concurrency: usize,
    next_seq: u64,
    wake: Arc<Notify>,
    publisher: Option<Publisher>,
}

impl TaskPoolManager {
    pub fn new(env: Arc<PipelineEnv>, log: Arc<dyn LogSink>) -> Self {
        let max_concurrency = env.settings.pool.max_concurrency.max(1);
        Self {
            env,
            log,
            pool: HashMap::new(),
            max_concurrency,
            next_seq: 0,
            wake: Arc::new(Notify::new()),
            publisher: None,
        }
    }

    /// Override the concurrency cap (minimum 1).
    pub fn with_max_concurrency(mut self, cap: usize) -> Self {
        self.max_concurrency = cap.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Signal that triggers a reconciliation pass.
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Publisher used for task-finish and remote-discovery notifications.
    ///
    /// Set automatically when running as an actor.
    pub fn set_publisher(&mut self, publisher: Publisher) {
        self.publisher = Some(publisher);
    }

    fn hooks(&self) -> TaskHooks {
        let wake = Arc::clone(&self.wake);
        let finished = Arc::new(move |name: &str, status: TaskStatus| {
            debug!(task = %name, %status, "task signalled completion");
            wake.notify_one();
        });

        let publisher = self.publisher.clone();
        let remote_discovered = Arc::new(move |patch: BuildConfigPatch| {
            let Some(publisher) = publisher.clone() else {
                debug!(?patch, "no publisher; discovered remote not persisted");
                return;
            };
            tokio::spawn(async move {
                let event = Event::Config(ConfigEvent::Modify(Envelope::data(patch)));
                if let Err(e) = publisher.publish(event).await {
                    warn!(error = %e, "failed to publish discovered remote");
                }
            });
        });

        TaskHooks {
            log: Arc::clone(&self.log),
            finished,
            remote_discovered,
        }
    }

    /// Add a task to the pool. Returns the reply text.
    pub fn create_task(&mut self, config: BuildConfig) -> String {
        if !config.is_valid() {
            warn!(task = %config.name(), "rejecting invalid build config");
            return INVALID_CONFIG.to_string();
        }
        if self.pool.contains_key(config.name()) {
            warn!(task = %config.name(), "rejecting duplicated task");
            return DUPLICATED.to_string();
        }

        let seq = self.next_seq;
        let name = config.name().to_string();
        match TaskEntity::new(config, seq, Arc::clone(&self.env), self.hooks()) {
            Ok(entity) => {
                self.next_seq += 1;
                self.pool.insert(name.clone(), entity);
                self.log.log(&name, "Task created");
                info!(task = %name, seq, "task created");
                self.wake.notify_one();
                SUCCESS.to_string()
            }
            Err(e) => {
                warn!(task = %name, error = %e, "failed to create task");
                e.to_string()
            }
        }
    }

    pub fn stop_task(&mut self, name: &str) -> String {
        match self.pool.get(name) {
            Some(entity) => {
                entity.stop();
                self.wake.notify_one();
                SUCCESS.to_string()
            }
            None => NOT_FOUND.to_string(),
        }
    }

    /// Status text of `name`, or `"Null"` when it is not in the pool.
    pub fn task_status(&self, name: &str) -> String {
        self.pool
            .get(name)
            .map(|e| e.status().to_string())
            .unwrap_or_else(|| STATUS_NOT_FOUND.to_string())
    }

    fn names_where(&self, keep: impl Fn(&TaskEntity) -> bool) -> Vec<String> {
        let mut entities: Vec<&TaskEntity> = self.pool.values().filter(|e| keep(e)).collect();
        entities.sort_by_key(|e| e.seq());
        entities.into_iter().map(|e| e.name().to_string()).collect()
    }

    /// Every task in the pool, in creation order.
    pub fn processing_list(&self) -> Vec<String> {
        self.names_where(|_| true)
    }

    pub fn waiting_list(&self) -> Vec<String> {
        self.names_where(|e| e.status() == TaskStatus::Waiting)
    }

    pub fn working_list(&self) -> Vec<String> {
        self.names_where(|e| e.status() == TaskStatus::Working)
    }

    pub fn entity(&self, name: &str) -> Option<&TaskEntity> {
        self.pool.get(name)
    }

    /// One reconciliation pass: drop terminal tasks, then admit waiting ones.
    pub async fn reconcile(&mut self) {
        let done: Vec<String> = self
            .pool
            .iter()
            .filter(|(_, e)| e.status().is_terminal())
            .map(|(name, _)| name.clone())
            .collect();

        for name in done {
            let Some(entity) = self.pool.remove(&name) else {
                continue;
            };
            let status = entity.status();
            entity.close();
            drop(entity);

            self.log.log(&name, "Removed");
            info!(task = %name, %status, "task removed from pool");
            if let Some(publisher) = self.publisher.clone() {
                // Off-lane: the router may be blocked delivering into our mailbox.
                tokio::spawn(async move {
                    let event = Event::Server(ServerEvent::TaskFinish(Envelope::data(name.clone())));
                    if let Err(e) = publisher.publish(event).await {
                        warn!(task = %name, error = %e, "failed to announce finished task");
                    }
                });
            }
        }

        let candidates: Vec<Candidate> = self
            .pool
            .values()
            .map(|e| Candidate {
                name: e.name().to_string(),
                seq: e.seq(),
                status: e.status(),
                source: e.source(),
            })
            .collect();

        for name in admit(&candidates, self.max_concurrency) {
            let Some(entity) = self.pool.get(&name) else {
                continue;
            };
            if let Err(e) = entity.start() {
                error!(task = %name, error = %e, "failed to start task");
                entity.mark_failed(&e.to_string());
                self.wake.notify_one();
            }
        }
    }

    /// Stop and release every task.
    pub fn close_all(&mut self) {
        for (name, entity) in self.pool.drain() {
            debug!(task = %name, "closing task on shutdown");
            entity.close();
        }
    }
}

impl Actor for TaskPoolManager {
    fn name(&self) -> &'static str {
        "task-pool"
    }

    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::Pool]
    }

    async fn started(&mut self, ctx: &ActorContext) {
        self.publisher = Some(ctx.publisher().clone());
        info!(max_concurrency = self.max_concurrency, "task pool ready");
    }

    fn wake_period(&self) -> Option<std::time::Duration> {
        Some(self.env.settings.pool.reconcile_interval)
    }

    fn wake_signal(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.wake))
    }

    async fn on_wake(&mut self, _ctx: &ActorContext) {
        self.reconcile().await;
    }

    async fn handle(&mut self, event: Event, _ctx: &ActorContext) {
        let Event::Pool(event) = event else {
            return;
        };

        match event {
            PoolEvent::CreateTask(envelope) => {
                let (config, reply) = envelope.into_parts();
                reply.send(self.create_task(config));
            }
            PoolEvent::StopTask(envelope) => {
                let (name, reply) = envelope.into_parts();
                reply.send(self.stop_task(&name));
            }
            PoolEvent::TaskStatus(envelope) => {
                envelope.reply(self.task_status(envelope.payload()));
            }
            PoolEvent::ProcessingList(envelope) => {
                envelope.reply(self.processing_list());
            }
            PoolEvent::WaitingList(envelope) => {
                envelope.reply(self.waiting_list());
            }
            PoolEvent::WorkingList(envelope) => {
                envelope.reply(self.working_list());
            }
        }
    }

    async fn stopping(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::exec::ShellRunner;
    use crate::sink::BroadcastSink;

    fn manager() -> TaskPoolManager {
        let env = Arc::new(PipelineEnv::new(Settings::default(), Arc::new(ShellRunner)));
        TaskPoolManager::new(env, Arc::new(BroadcastSink::default()))
    }

    #[test]
    fn duplicate_names_are_rejected_without_replacing() {
        let mut pool = manager();
        let first = BuildConfig::new("r1", "router", "release");
        let second = BuildConfig::new("r1", "switch", "debug");
        assert_eq!(pool.create_task(first), SUCCESS);
        assert_eq!(pool.create_task(second), DUPLICATED);
        assert_eq!(pool.entity("r1").unwrap().config().category(), "router");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut pool = manager();
        assert_eq!(pool.create_task(BuildConfig::new("r1", "", "release")), INVALID_CONFIG);
        assert!(pool.processing_list().is_empty());
    }

    #[test]
    fn unknown_names() {
        let mut pool = manager();
        assert_eq!(pool.task_status("ghost"), STATUS_NOT_FOUND);
        assert_eq!(pool.stop_task("ghost"), NOT_FOUND);
    }

    #[tokio::test]
    async fn stopped_waiting_task_is_removed_on_next_pass() {
        let mut pool = manager();
        pool.create_task(BuildConfig::new("r1", "router", "release"));
        assert_eq!(pool.stop_task("r1"), SUCCESS);
        assert_eq!(pool.task_status("r1"), "Finished");

        pool.reconcile().await;
        assert_eq!(pool.task_status("r1"), STATUS_NOT_FOUND);
    }

    #[tokio::test]
    async fn finished_task_is_announced_even_when_the_queue_is_full() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let publisher = Publisher::new("task-pool", tx);
        publisher.try_publish(Event::shutdown(0)).unwrap();

        let mut pool = manager();
        pool.set_publisher(publisher);
        pool.create_task(BuildConfig::new("r1", "router", "release"));
        pool.stop_task("r1");
        pool.reconcile().await;

        assert!(matches!(rx.recv().await, Some(Event::Shutdown(_))));
        let announced = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        match announced {
            Some(Event::Server(ServerEvent::TaskFinish(env))) => assert_eq!(env.payload(), "r1"),
            other => panic!("expected TaskFinish, got {other:?}"),
        }
    }

    #[test]
    fn lists_follow_creation_order() {
        let mut pool = manager();
        for name in ["c", "a", "b"] {
            pool.create_task(BuildConfig::new(name, "router", "release"));
        }
        assert_eq!(pool.processing_list(), vec!["c", "a", "b"]);
        assert_eq!(pool.waiting_list(), vec!["c", "a", "b"]);
        assert!(pool.working_list().is_empty());
    }
}
