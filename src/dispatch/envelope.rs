// src/dispatch/envelope.rs

//! Request/response envelope used for every cross-actor call.
//!
//! An [`Envelope`] carries a payload and a [`Reply`] slot. The reply function
//! runs at most once per message: the slot is shared between clones of the
//! envelope, so an event fanned out to several actors still answers the
//! caller a single time (the first responder wins, later calls are no-ops).
//!
//! Callers waiting on a reply must bound the wait themselves, see
//! [`Publisher::request`](super::Publisher::request).

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

type ReplyFn<R> = Box<dyn FnOnce(R) + Send>;

/// One-shot reply slot.
pub struct Reply<R> {
    slot: Arc<Mutex<Option<ReplyFn<R>>>>,
}

impl<R> Reply<R> {
    pub fn new(f: impl FnOnce(R) + Send + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// A slot nobody listens on; sending into it is a no-op.
    pub fn none() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Invoke the reply function if it has not been used yet.
    ///
    /// Returns `false` when the slot was already spent (or never armed).
    pub fn send(&self, value: R) -> bool {
        let f = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match f {
            Some(f) => {
                f(value);
                true
            }
            None => false,
        }
    }

    pub fn is_spent(&self) -> bool {
        match self.slot.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl<R> Clone for Reply<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R> fmt::Debug for Reply<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// Payload plus reply slot.
pub struct Envelope<T, R> {
    payload: T,
    reply: Reply<R>,
}

impl<T, R> Envelope<T, R> {
    /// Envelope whose reply is delivered to `on_reply`.
    pub fn new(payload: T, on_reply: impl FnOnce(R) + Send + 'static) -> Self {
        Self {
            payload,
            reply: Reply::new(on_reply),
        }
    }

    /// Fire-and-forget envelope; any reply is discarded.
    pub fn data(payload: T) -> Self {
        Self {
            payload,
            reply: Reply::none(),
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Answer the sender. See [`Reply::send`].
    pub fn reply(&self, value: R) -> bool {
        self.reply.send(value)
    }

    pub fn into_parts(self) -> (T, Reply<R>) {
        (self.payload, self.reply)
    }
}

impl<T, R: Send + 'static> Envelope<T, R> {
    /// Envelope paired with a receiver for its reply.
    ///
    /// The receiver errors if every copy of the envelope is dropped without
    /// replying.
    pub fn request(payload: T) -> (Self, oneshot::Receiver<R>) {
        let (tx, rx) = oneshot::channel();
        let envelope = Self::new(payload, move |value| {
            let _ = tx.send(value);
        });
        (envelope, rx)
    }
}

impl<T: Clone, R> Clone for Envelope<T, R> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            reply: self.reply.clone(),
        }
    }
}

impl<T: fmt::Debug, R> fmt::Debug for Envelope<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("payload", &self.payload)
            .field("reply", &self.reply)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reply_runs_at_most_once_across_clones() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let envelope: Envelope<&str, u32> = Envelope::new("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let copy = envelope.clone();

        assert!(envelope.reply(1));
        assert!(!copy.reply(2));
        assert!(!envelope.reply(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn data_envelopes_swallow_replies() {
        let envelope: Envelope<u8, String> = Envelope::data(7);
        assert!(!envelope.reply("ignored".into()));
        assert_eq!(*envelope.payload(), 7);
    }

    #[tokio::test]
    async fn request_receiver_gets_the_value() {
        let (envelope, rx) = Envelope::<(), String>::request(());
        let (_, reply) = envelope.into_parts();
        reply.send("Success".into());
        assert_eq!(rx.await.unwrap(), "Success");
    }

    #[tokio::test]
    async fn dropped_request_errors_the_receiver() {
        let (envelope, rx) = Envelope::<(), String>::request(());
        drop(envelope);
        assert!(rx.await.is_err());
    }
}
