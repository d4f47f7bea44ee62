//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the **event source** side of propagation: whatever observes
//! primary document changes publishes envelopes here, and the propagation
//! worker subscribes.
//!
//! ## Delivery contract
//!
//! - **At-least-once**: an envelope may be delivered more than once.
//! - **No ordering guarantees**: envelopes for different documents (and even
//!   rapid successive envelopes for the same document) may interleave.
//!
//! Consumers must therefore be idempotent and must reason only about the
//! before/after snapshots an envelope carries.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

/// A subscription to an event stream.
///
/// Each subscription receives a copy of every message published after it was
/// created (broadcast semantics). `recv` returns `None` once the bus is gone.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Transport-agnostic pub/sub bus.
///
/// `publish` is synchronous so it can be called from inside a store commit
/// path without awaiting.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
