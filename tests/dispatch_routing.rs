mod common;
use crate::common::{init_tracing, with_timeout};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use muppet::dispatch::{Actor, ActorContext, ActorHandle, Envelope, EventRouter};
use muppet::events::{ConfigEvent, Event, EventKind, PoolEvent};

/// Records the names carried by `TaskStatus` events and answers them.
struct Recorder {
    name: &'static str,
    interests: Vec<EventKind>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn new(name: &'static str, interests: Vec<EventKind>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name,
                interests,
                seen: seen.clone(),
            },
            seen,
        )
    }
}

impl Actor for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn interests(&self) -> Vec<EventKind> {
        self.interests.clone()
    }

    async fn handle(&mut self, event: Event, _ctx: &ActorContext) {
        match event {
            Event::Pool(PoolEvent::TaskStatus(env)) => {
                self.seen.lock().unwrap().push(env.payload().clone());
                env.reply(self.name.to_string());
            }
            Event::Config(ConfigEvent::Save(env)) => {
                self.seen.lock().unwrap().push("save".to_string());
                env.reply(self.name.to_string());
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn events_fan_out_by_interest_with_single_reply() {
    init_tracing();
    let (a, seen_a) = Recorder::new("a", vec![EventKind::Config]);
    let (b, seen_b) = Recorder::new("b", vec![EventKind::Config, EventKind::Pool]);
    let (c, seen_c) = Recorder::new("c", vec![EventKind::Pool]);

    let router = EventRouter::new(
        vec![
            ActorHandle::spawn(a, 8),
            ActorHandle::spawn(b, 8),
            ActorHandle::spawn(c, 8),
        ],
        8,
    );
    let publisher = router.publisher();
    let running = tokio::spawn(router.run());

    let reply = publisher
        .request((), |env| Event::Config(ConfigEvent::Save(env)), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(reply == "a" || reply == "b");

    // Both config listeners handled it; the pool-only actor never saw it.
    let both = common::eventually(|| {
        seen_a.lock().unwrap().len() == 1 && seen_b.lock().unwrap().len() == 1
    })
    .await;
    assert!(both);
    assert!(seen_c.lock().unwrap().is_empty());

    publisher.shutdown(0).await.unwrap();
    assert_eq!(with_timeout(running).await.unwrap(), 0);
}

#[tokio::test]
async fn single_source_order_is_preserved() {
    init_tracing();
    let (rec, seen) = Recorder::new("rec", vec![EventKind::Pool]);
    let router = EventRouter::new(vec![ActorHandle::spawn(rec, 4)], 4);
    let publisher = router.publisher();
    let running = tokio::spawn(router.run());

    for i in 0..50 {
        let event = Event::Pool(PoolEvent::TaskStatus(Envelope::data(i.to_string())));
        publisher.publish(event).await.unwrap();
    }
    // A request behind them proves the earlier ones were handled.
    publisher
        .request("last".to_string(), |env| Event::Pool(PoolEvent::TaskStatus(env)), Duration::from_secs(5))
        .await
        .unwrap();

    let expected: Vec<String> = (0..50).map(|i| i.to_string()).chain(["last".to_string()]).collect();
    assert_eq!(*seen.lock().unwrap(), expected);

    publisher.shutdown(0).await.unwrap();
    with_timeout(running).await.unwrap();
}

#[tokio::test]
async fn shutdown_payload_becomes_exit_code() {
    init_tracing();
    let (rec, _) = Recorder::new("rec", vec![EventKind::Pool]);
    let router = EventRouter::new(vec![ActorHandle::spawn(rec, 4)], 4);
    let publisher = router.publisher();
    let running = tokio::spawn(router.run());

    publisher.publish(Event::shutdown("7")).await.unwrap();
    assert_eq!(with_timeout(running).await.unwrap(), 7);
}

#[tokio::test]
async fn unanswered_request_times_out() {
    init_tracing();
    // Nobody is interested in pool events.
    let (rec, _) = Recorder::new("rec", vec![EventKind::Server]);
    let router = EventRouter::new(vec![ActorHandle::spawn(rec, 4)], 4);
    let publisher = router.publisher();
    let running = tokio::spawn(router.run());

    let result = publisher
        .request("x".to_string(), |env| Event::Pool(PoolEvent::TaskStatus(env)), Duration::from_millis(200))
        .await;
    // The event is dropped unrouted, so the reply slot is dropped too.
    assert!(result.is_err());

    publisher.shutdown(0).await.unwrap();
    with_timeout(running).await.unwrap();
}
