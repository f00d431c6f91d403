// src/dispatch/publisher.rs

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use super::envelope::Envelope;
use crate::errors::{MuppetError, Result};
use crate::events::Event;

/// Write side of an outbound queue read by the router.
///
/// Every actor gets one for its own outbound queue (via
/// [`ActorContext`](super::ActorContext)); code outside the actor set gets
/// one from [`EventRouter::publisher`](super::EventRouter::publisher).
#[derive(Debug, Clone)]
pub struct Publisher {
    source: String,
    tx: mpsc::Sender<Event>,
}

impl Publisher {
    pub fn new(source: impl Into<String>, tx: mpsc::Sender<Event>) -> Self {
        Self {
            source: source.into(),
            tx,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Queue an event for routing, waiting for room if the queue is full.
    pub async fn publish(&self, event: Event) -> Result<()> {
        trace!(source = %self.source, kind = %event.kind(), "publishing event");
        self.tx
            .send(event)
            .await
            .map_err(|_| MuppetError::ActorGone(self.source.clone()))
    }

    /// Queue an event without waiting; fails when the queue is full.
    pub fn try_publish(&self, event: Event) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(ev) => MuppetError::QueueFull {
                source_name: self.source.clone(),
                kind: ev.kind().to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => MuppetError::ActorGone(self.source.clone()),
        })
    }

    /// Publish a request and wait up to `timeout` for its reply.
    ///
    /// `wrap` places the envelope into the matching event variant, e.g.
    /// `|env| Event::Pool(PoolEvent::TaskStatus(env))`.
    pub async fn request<T, R>(
        &self,
        payload: T,
        wrap: impl FnOnce(Envelope<T, R>) -> Event,
        timeout: Duration,
    ) -> Result<R>
    where
        R: Send + 'static,
    {
        let (envelope, rx) = Envelope::request(payload);
        self.publish(wrap(envelope)).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(MuppetError::NoReply),
            Err(_) => Err(MuppetError::Timeout(timeout)),
        }
    }

    /// Ask the router to shut the process down with `code`.
    pub async fn shutdown(&self, code: i32) -> Result<()> {
        self.publish(Event::shutdown(code)).await
    }
}
