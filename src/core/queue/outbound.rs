use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::message::Message;
use crate::core::queue::OverflowPolicy;

/// Result of offering a message to an [`OutboundQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue full under [`OverflowPolicy::DropNewest`]; the message was dropped.
    Dropped,
    /// Queue full under [`OverflowPolicy::Disconnect`]; the message was
    /// dropped and the owner must be disconnected.
    Overflow,
    /// The writer side is gone; the connection is already tearing down.
    Closed,
}

/// Producer half of a connection's bounded outbound FIFO.
///
/// A message holds its slot from enqueue until the writer calls
/// [`OutboundReceiver::release`] after writing it, so messages already taken
/// by the writer still count against `capacity`.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    sender: flume::Sender<Arc<Message>>,
    slots: Arc<AtomicUsize>,
    capacity: usize,
    policy: OverflowPolicy,
}

/// Consumer half, owned by the connection's writer task.
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: flume::Receiver<Arc<Message>>,
    slots: Arc<AtomicUsize>,
}

/// Creates a queue holding at most `capacity` messages.
pub fn outbound_queue(
    capacity: usize,
    policy: OverflowPolicy,
) -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = flume::bounded(capacity);
    let slots = Arc::new(AtomicUsize::new(0));
    (
        OutboundQueue {
            sender: tx,
            slots: Arc::clone(&slots),
            capacity,
            policy,
        },
        OutboundReceiver {
            receiver: rx,
            slots,
        },
    )
}

impl OutboundQueue {
    /// Offers `message` without waiting.
    #[inline]
    pub fn enqueue(&self, message: Arc<Message>) -> EnqueueOutcome {
        let reserved = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .is_ok();
        if !reserved {
            return self.overflow();
        }

        match self.sender.try_send(message) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(flume::TrySendError::Full(_)) => {
                self.slots.fetch_sub(1, Ordering::AcqRel);
                self.overflow()
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                self.slots.fetch_sub(1, Ordering::AcqRel);
                EnqueueOutcome::Closed
            }
        }
    }

    fn overflow(&self) -> EnqueueOutcome {
        match self.policy {
            OverflowPolicy::DropNewest => EnqueueOutcome::Dropped,
            OverflowPolicy::Disconnect => EnqueueOutcome::Overflow,
        }
    }

    /// Messages queued or taken by the writer but not yet released.
    pub fn len(&self) -> usize {
        self.slots.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl OutboundReceiver {
    pub async fn recv_async(&self) -> Result<Arc<Message>, flume::RecvError> {
        self.receiver.recv_async().await
    }

    pub fn try_recv(&self) -> Result<Arc<Message>, flume::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Frees the slots of `count` messages that have been written out.
    pub fn release(&self, count: usize) {
        let _ = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(count))
            });
    }
}
