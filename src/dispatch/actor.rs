// src/dispatch/actor.rs

//! Actor trait and mailbox worker.
//!
//! Each actor runs on its own Tokio task and handles mailbox events strictly
//! one at a time, so actor state needs no locking. An actor can also ask to
//! be woken periodically ([`Actor::wake_period`]) or on demand
//! ([`Actor::wake_signal`]); wake-ups run on the same task as mailbox
//! handlers and never overlap with them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::publisher::Publisher;
use crate::errors::{MuppetError, Result};
use crate::events::{Event, EventKind};

pub trait Actor: Send + 'static {
    fn name(&self) -> &'static str;

    /// Event kinds the router should deliver to this actor's mailbox.
    fn interests(&self) -> Vec<EventKind>;

    /// Handle one mailbox event.
    fn handle(&mut self, event: Event, ctx: &ActorContext) -> impl Future<Output = ()> + Send;

    /// Runs once on the actor's task before the first event.
    fn started(&mut self, _ctx: &ActorContext) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Period of the fallback wake-up timer, if any.
    fn wake_period(&self) -> Option<Duration> {
        None
    }

    /// Signal that wakes the actor on demand. Notifications coalesce: any
    /// number of `notify_one` calls while the actor is busy yield one wake-up.
    fn wake_signal(&self) -> Option<Arc<Notify>> {
        None
    }

    /// Runs when either wake-up source fires.
    fn on_wake(&mut self, _ctx: &ActorContext) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Release resources; runs once when the actor is shut down.
    fn stopping(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// What an actor can reach from inside its handlers.
#[derive(Debug, Clone)]
pub struct ActorContext {
    name: &'static str,
    publisher: Publisher,
    cancel: CancellationToken,
}

impl ActorContext {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publisher for this actor's outbound queue.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Cancelled when the actor is being shut down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Handle to a running actor, owned by the router.
#[derive(Debug)]
pub struct ActorHandle {
    name: &'static str,
    interests: Vec<EventKind>,
    mailbox: mpsc::Sender<Event>,
    outbound: Option<mpsc::Receiver<Event>>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl ActorHandle {
    /// Start `actor` on its own task with mailbox and outbound queues of
    /// `capacity` entries each.
    pub fn spawn<A: Actor>(mut actor: A, capacity: usize) -> Self {
        let name = actor.name();
        let interests = actor.interests();
        let (mailbox_tx, mut mailbox_rx) = mpsc::channel::<Event>(capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel::<Event>(capacity.max(1));
        let cancel = CancellationToken::new();

        let ctx = ActorContext {
            name,
            publisher: Publisher::new(name, outbound_tx),
            cancel: cancel.clone(),
        };

        let worker = tokio::spawn(async move {
            debug!(actor = name, "actor started");
            actor.started(&ctx).await;

            let signal = actor.wake_signal();
            let mut ticker = actor.wake_period().map(|period| {
                let mut t = tokio::time::interval(period);
                t.set_missed_tick_behavior(MissedTickBehavior::Delay);
                t
            });

            loop {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    event = mailbox_rx.recv() => match event {
                        Some(event) => actor.handle(event, &ctx).await,
                        None => break,
                    },
                    _ = notified(signal.as_deref()) => actor.on_wake(&ctx).await,
                    _ = tick(ticker.as_mut()) => actor.on_wake(&ctx).await,
                }
            }

            actor.stopping().await;
            debug!(actor = name, "actor stopped");
        });

        Self {
            name,
            interests,
            mailbox: mailbox_tx,
            outbound: Some(outbound_rx),
            cancel,
            worker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interests(&self) -> &[EventKind] {
        &self.interests
    }

    pub fn is_interested(&self, kind: EventKind) -> bool {
        self.interests.contains(&kind)
    }

    /// Enqueue an event into this actor's mailbox, waiting for room.
    pub async fn send(&self, event: Event) -> Result<()> {
        self.mailbox
            .send(event)
            .await
            .map_err(|_| MuppetError::ActorGone(self.name.to_string()))
    }

    pub(crate) fn mailbox(&self) -> mpsc::Sender<Event> {
        self.mailbox.clone()
    }

    pub(crate) fn take_outbound(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.outbound.take()
    }

    /// Stop the worker and wait for its `stopping` hook to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.worker.await {
            warn!(actor = self.name, error = %e, "actor worker ended abnormally");
        }
    }
}

async fn notified(signal: Option<&Notify>) {
    match signal {
        Some(signal) => signal.notified().await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
