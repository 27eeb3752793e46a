//! Block consumers and the standard channel-backed implementation.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::sync::mpsc;
use tracing::trace;

use crate::{event::BlockEvent, subscription::Subscription};

/// Identifies an attachment to the [`ChainMonitor`](crate::ChainMonitor).
///
/// Ids are never reused by a monitor, so a stale id can safely be detached twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub(crate) u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Anything that wants to hear about new blocks.
pub trait BlockConsumer: fmt::Debug + Send + Sync {
    /// Hands a block to the consumer. Must not block.
    fn deliver(&self, event: BlockEvent);

    /// Whether the consumer currently wants blocks.
    fn is_awake(&self) -> bool;
}

/// The usual [`BlockConsumer`]: an unbounded outbox paired with a shared asleep flag.
///
/// The owner of the flag decides when the consumer sleeps. The monitor only reads it.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    outbox: mpsc::UnboundedSender<BlockEvent>,
    asleep: Arc<AtomicBool>,
}

impl ConsumerHandle {
    /// Creates a handle reading `asleep` and the [`Subscription`] its blocks end up in.
    pub fn new(asleep: Arc<AtomicBool>) -> (Self, Subscription<BlockEvent>) {
        let (outbox, inbox) = mpsc::unbounded_channel();

        (Self { outbox, asleep }, Subscription::from_receiver(inbox))
    }
}

impl BlockConsumer for ConsumerHandle {
    fn deliver(&self, event: BlockEvent) {
        if self.outbox.send(event).is_err() {
            trace!(height = %event.height, "consumer inbox closed, dropping block");
        }
    }

    fn is_awake(&self) -> bool {
        !self.asleep.load(Ordering::SeqCst)
    }
}
