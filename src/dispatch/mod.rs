// src/dispatch/mod.rs

//! Actor-style message dispatch.
//!
//! - [`envelope`]: payload + at-most-once reply slot.
//! - [`actor`]: the [`Actor`] trait and the mailbox worker behind
//!   [`ActorHandle`].
//! - [`publisher`]: write side of an outbound queue, with request/reply
//!   helpers.
//! - [`router`]: the [`EventRouter`] that fans events out by kind.

pub mod actor;
pub mod envelope;
pub mod publisher;
pub mod router;

pub use actor::{Actor, ActorContext, ActorHandle};
pub use envelope::{Envelope, Reply};
pub use publisher::Publisher;
pub use router::{EventRouter, exit_code};
