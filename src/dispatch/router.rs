// src/dispatch/router.rs

//! Process-wide event hub.
//!
//! The router owns every actor handle. While running it pumps each actor's
//! outbound queue (plus one external queue for code outside the actor set)
//! on its own task and forwards each event, unchanged, to every actor that
//! declared interest in the event's kind. Events from one source keep their
//! publish order; events from different sources may interleave.
//!
//! A [`Event::Shutdown`] stops all pumps and tears the actors down. Its
//! payload becomes the exit code returned by [`EventRouter::run`].

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::actor::ActorHandle;
use super::publisher::Publisher;
use crate::events::{Event, EventKind};

/// Name of the source used by [`EventRouter::publisher`].
pub const EXTERNAL_SOURCE: &str = "external";

struct Route {
    name: &'static str,
    interests: Vec<EventKind>,
    mailbox: mpsc::Sender<Event>,
}

pub struct EventRouter {
    actors: Vec<ActorHandle>,
    external_tx: mpsc::Sender<Event>,
    external_rx: mpsc::Receiver<Event>,
}

impl EventRouter {
    /// Build a router over a fixed set of already-spawned actors.
    pub fn new(actors: Vec<ActorHandle>, capacity: usize) -> Self {
        let (external_tx, external_rx) = mpsc::channel(capacity.max(1));
        Self {
            actors,
            external_tx,
            external_rx,
        }
    }

    /// Publisher for callers outside the actor set (CLI, signal handlers,
    /// tests).
    pub fn publisher(&self) -> Publisher {
        Publisher::new(EXTERNAL_SOURCE, self.external_tx.clone())
    }

    pub fn actor_names(&self) -> Vec<&'static str> {
        self.actors.iter().map(|a| a.name()).collect()
    }

    /// Route events until a shutdown event arrives, then shut every actor
    /// down and return the requested exit code.
    ///
    /// Returns 0 if every source closes without asking for shutdown.
    pub async fn run(self) -> i32 {
        let EventRouter {
            mut actors,
            external_tx,
            external_rx,
        } = self;
        drop(external_tx);

        let routes: Arc<Vec<Route>> = Arc::new(
            actors
                .iter()
                .map(|a| Route {
                    name: a.name(),
                    interests: a.interests().to_vec(),
                    mailbox: a.mailbox(),
                })
                .collect(),
        );

        let mut sources: Vec<(String, mpsc::Receiver<Event>)> = actors
            .iter_mut()
            .filter_map(|a| a.take_outbound().map(|rx| (a.name().to_string(), rx)))
            .collect();
        sources.push((EXTERNAL_SOURCE.to_string(), external_rx));

        let stop = CancellationToken::new();
        let (exit_tx, mut exit_rx) = mpsc::channel::<i32>(1);
        let mut pumps = JoinSet::new();
        for (source, rx) in sources {
            pumps.spawn(pump(
                source,
                rx,
                Arc::clone(&routes),
                exit_tx.clone(),
                stop.clone(),
            ));
        }
        drop(exit_tx);

        info!(actors = ?actors.iter().map(|a| a.name()).collect::<Vec<_>>(), "router running");

        let code = exit_rx.recv().await.unwrap_or(0);

        info!(exit_code = code, "tearing down actors");
        stop.cancel();
        pumps.shutdown().await;
        drop(routes);

        join_all(actors.into_iter().map(ActorHandle::shutdown)).await;
        info!(exit_code = code, "all actors stopped");
        code
    }
}

/// Exit code carried by a shutdown payload; anything that is not an integer
/// maps to 0.
pub fn exit_code(payload: &str) -> i32 {
    payload.trim().parse().unwrap_or(0)
}

async fn pump(
    source: String,
    mut rx: mpsc::Receiver<Event>,
    routes: Arc<Vec<Route>>,
    exit_tx: mpsc::Sender<i32>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            Event::Shutdown(envelope) => {
                let (payload, reply) = envelope.into_parts();
                let code = exit_code(&payload);
                info!(source = %source, exit_code = code, "shutdown requested");
                reply.send(());
                let _ = exit_tx.try_send(code);
                break;
            }
            event => {
                if !deliver(&source, event, &routes, &stop).await {
                    break;
                }
            }
        }
    }
    debug!(source = %source, "pump stopped");
}

/// Forward `event` to every interested route. Returns `false` once the
/// router is stopping.
async fn deliver(source: &str, event: Event, routes: &[Route], stop: &CancellationToken) -> bool {
    let kind = event.kind();
    let targets: Vec<&Route> = routes
        .iter()
        .filter(|r| r.interests.contains(&kind))
        .collect();

    if targets.is_empty() {
        debug!(source, %kind, "no actor interested in event; dropped");
        return true;
    }

    for route in targets {
        let sent = tokio::select! {
            _ = stop.cancelled() => return false,
            sent = route.mailbox.send(event.clone()) => sent,
        };
        if sent.is_err() {
            warn!(source, target = route.name, %kind, "target mailbox closed; event dropped");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_parses_integers_and_defaults_to_zero() {
        assert_eq!(exit_code("3"), 3);
        assert_eq!(exit_code(" -1 "), -1);
        assert_eq!(exit_code("bye"), 0);
        assert_eq!(exit_code(""), 0);
    }
}
